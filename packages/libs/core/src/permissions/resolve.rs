//! 값 해석기
//!
//! 규칙의 참조 문자열을 평가 상태에 대해 해석합니다.
//!
//! # 참조 문법
//!
//! - `args.find.userId`: 루트(`args`/`auth`/`res`)부터 `.`으로 구분한 경로
//! - `args.items.0`: 배열 원소는 10진수 인덱스
//! - `args.users[args.auth.id].role`: `[...]` 안의 참조를 먼저 해석해 키로 사용
//! - `utils.now()`, `utils.addDuration(args.date, '1h')`: 헬퍼 함수 호출
//! - 그 외 문자열은 리터럴
//!
//! 루트가 아닌 첫 세그먼트로 시작하는 점 표기 문자열은 `args`에 그 키가 있을 때만
//! `args` 기준 경로로 해석하고, 그렇지 않으면 리터럴로 취급합니다.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Timelike, Utc};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

pub const ROOT_ARGS: &str = "args";
pub const ROOT_AUTH: &str = "auth";
pub const ROOT_RES: &str = "res";

const ROOTS: [&str; 3] = [ROOT_ARGS, ROOT_AUTH, ROOT_RES];
const UTILS_PREFIX: &str = "utils.";

/// 참조를 값으로 해석
///
/// 문자열이 아닌 값은 그대로 반환합니다.
pub fn resolve(reference: &Value, state: &Map<String, Value>) -> Result<Value> {
    match reference {
        Value::String(raw) => resolve_str(raw, state),
        literal => Ok(literal.clone()),
    }
}

/// 참조 문자열 해석
pub fn resolve_str(raw: &str, state: &Map<String, Value>) -> Result<Value> {
    if let Some(call) = raw.strip_prefix(UTILS_PREFIX) {
        return call_function(call, state);
    }

    if !raw.contains('.') {
        return Ok(Value::String(raw.to_string()));
    }

    let head = base_name(first_segment(raw));
    if ROOTS.contains(&head) {
        return load_value(raw, state);
    }

    let in_args = matches!(state.get(ROOT_ARGS), Some(Value::Object(args)) if args.contains_key(head));
    if in_args {
        return load_value(&format!("{ROOT_ARGS}.{raw}"), state);
    }

    Ok(Value::String(raw.to_string()))
}

/// 경로의 루트 세그먼트
pub fn root_of(path: &str) -> &str {
    base_name(first_segment(path))
}

/// 경로가 가리키는 값을 읽음
pub fn load_value(path: &str, state: &Map<String, Value>) -> Result<Value> {
    let segments = resolve_segments(path, state)?;
    let (root, rest) = split_root(&segments, path)?;

    let mut current = state
        .get(root.as_str())
        .ok_or_else(|| Error::path_not_found(path))?;
    for key in rest {
        current = child(current, key, path)?;
    }
    Ok(current.clone())
}

/// 경로에 값을 저장
///
/// 중간 객체가 없으면 만들어 채웁니다. 배열은 기존 인덱스만 덮어쓸 수 있습니다.
pub fn store_value(path: &str, value: Value, state: &mut Map<String, Value>) -> Result<()> {
    let segments = resolve_segments(path, state)?;
    let (root, rest) = split_root(&segments, path)?;
    let Some((last, parents)) = rest.split_last() else {
        return Err(Error::path_not_found(path));
    };

    let mut current = state
        .get_mut(root.as_str())
        .ok_or_else(|| Error::path_not_found(path))?;
    for key in parents {
        current = child_or_insert(current, key, path)?;
    }

    match current {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(last, path)?;
            let slot = items
                .get_mut(index)
                .ok_or_else(|| Error::path_not_found(path))?;
            *slot = value;
            Ok(())
        }
        _ => Err(Error::type_mismatch(path, "object or array")),
    }
}

/// 경로의 값을 삭제
///
/// 삭제할 키가 없으면 `PathNotFound`입니다.
pub fn delete_value(path: &str, state: &mut Map<String, Value>) -> Result<()> {
    let segments = resolve_segments(path, state)?;
    let (root, rest) = split_root(&segments, path)?;
    let Some((last, parents)) = rest.split_last() else {
        return Err(Error::path_not_found(path));
    };

    let mut current = state
        .get_mut(root.as_str())
        .ok_or_else(|| Error::path_not_found(path))?;
    for key in parents {
        current = child_mut(current, key, path)?;
    }

    match current {
        Value::Object(map) => map
            .remove(last.as_str())
            .map(|_| ())
            .ok_or_else(|| Error::path_not_found(path)),
        Value::Array(items) => {
            let index = parse_index(last, path)?;
            if index >= items.len() {
                return Err(Error::path_not_found(path));
            }
            items.remove(index);
            Ok(())
        }
        _ => Err(Error::type_mismatch(path, "object or array")),
    }
}

/// 객체/배열 안의 문자열 참조를 재귀적으로 해석
///
/// 해석에 실패한 문자열은 그대로 둡니다. Query 규칙의 `find` 조건에 사용합니다.
pub fn adjust(value: &Value, state: &Map<String, Value>) -> Value {
    match value {
        Value::String(raw) => resolve_str(raw, state).unwrap_or_else(|_| value.clone()),
        Value::Object(map) => Value::Object(adjust_map(map, state)),
        Value::Array(items) => Value::Array(items.iter().map(|item| adjust(item, state)).collect()),
        literal => literal.clone(),
    }
}

pub fn adjust_map(map: &Map<String, Value>, state: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| (key.clone(), adjust(value, state)))
        .collect()
}

/// 타임스탬프 파싱 (RFC3339, 또는 시간대 없는 형식은 UTC로 간주)
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Utc.from_utc_datetime(&parsed));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }

    Err(Error::InvalidTimestamp {
        value: raw.to_string(),
    })
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

// ─────────────────────────────────────────────────────────────────────────────
// Path handling
// ─────────────────────────────────────────────────────────────────────────────

/// 괄호 안의 구분자는 무시하고 분리
fn split_outside_brackets(raw: &str, delimiter: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in raw.chars() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if c == delimiter && depth == 0 {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

fn first_segment(raw: &str) -> &str {
    raw.split('.').next().unwrap_or(raw)
}

fn base_name(segment: &str) -> &str {
    segment.split('[').next().unwrap_or(segment)
}

/// 경로를 세그먼트 목록으로 분해하고 `[...]` 첨자를 해석
fn resolve_segments(path: &str, state: &Map<String, Value>) -> Result<Vec<String>> {
    let mut segments = Vec::new();

    for part in split_outside_brackets(path, '.') {
        let Some(open) = part.find('[') else {
            segments.push(part);
            continue;
        };

        let name = &part[..open];
        if !name.is_empty() {
            segments.push(name.to_string());
        }

        let mut rest = &part[open..];
        while let Some(inner) = rest.strip_prefix('[') {
            let close = matching_bracket(inner).ok_or_else(|| Error::path_not_found(path))?;
            let key = resolve_str(&inner[..close], state)?;
            segments.push(subscript_key(&key, path)?);
            rest = &inner[close + 1..];
        }
        if !rest.is_empty() {
            return Err(Error::path_not_found(path));
        }
    }

    if segments.iter().any(String::is_empty) {
        return Err(Error::path_not_found(path));
    }
    Ok(segments)
}

fn matching_bracket(inner: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (index, c) in inner.char_indices() {
        match c {
            '[' => depth += 1,
            ']' if depth == 0 => return Some(index),
            ']' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn subscript_key(key: &Value, path: &str) -> Result<String> {
    match key {
        Value::String(key) => Ok(key.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(Error::type_mismatch(path, "string or number subscript")),
    }
}

fn split_root<'a>(segments: &'a [String], path: &str) -> Result<(&'a String, &'a [String])> {
    match segments.split_first() {
        Some((root, rest)) if !rest.is_empty() => Ok((root, rest)),
        _ => Err(Error::path_not_found(path)),
    }
}

fn parse_index(key: &str, path: &str) -> Result<usize> {
    key.parse()
        .map_err(|_| Error::type_mismatch(path, "array index"))
}

fn child<'v>(value: &'v Value, key: &str, path: &str) -> Result<&'v Value> {
    match value {
        Value::Object(map) => map.get(key).ok_or_else(|| Error::path_not_found(path)),
        Value::Array(items) => items
            .get(parse_index(key, path)?)
            .ok_or_else(|| Error::path_not_found(path)),
        _ => Err(Error::type_mismatch(path, "object or array")),
    }
}

fn child_mut<'v>(value: &'v mut Value, key: &str, path: &str) -> Result<&'v mut Value> {
    match value {
        Value::Object(map) => map.get_mut(key).ok_or_else(|| Error::path_not_found(path)),
        Value::Array(items) => items
            .get_mut(parse_index(key, path)?)
            .ok_or_else(|| Error::path_not_found(path)),
        _ => Err(Error::type_mismatch(path, "object or array")),
    }
}

fn child_or_insert<'v>(value: &'v mut Value, key: &str, path: &str) -> Result<&'v mut Value> {
    match value {
        Value::Object(map) => Ok(map
            .entry(key)
            .or_insert_with(|| Value::Object(Map::new()))),
        Value::Array(items) => items
            .get_mut(parse_index(key, path)?)
            .ok_or_else(|| Error::path_not_found(path)),
        _ => Err(Error::type_mismatch(path, "object or array")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper functions (utils.*)
// ─────────────────────────────────────────────────────────────────────────────

fn call_function(call: &str, state: &Map<String, Value>) -> Result<Value> {
    let (name, params) = match call.find('(') {
        Some(open) if call.ends_with(')') => (&call[..open], &call[open + 1..call.len() - 1]),
        _ => {
            return Err(Error::UnknownFunction {
                name: call.to_string(),
            })
        }
    };

    let params: Vec<String> = if params.trim().is_empty() {
        Vec::new()
    } else {
        split_outside_brackets(params, ',')
            .into_iter()
            .map(|param| param.trim().to_string())
            .collect()
    };

    match name {
        "now" => {
            expect_params(name, &params, 0)?;
            Ok(Value::String(format_timestamp(Utc::now())))
        }
        "exists" => {
            expect_params(name, &params, 1)?;
            Ok(Value::Bool(load_value(&params[0], state).is_ok()))
        }
        "length" => {
            expect_params(name, &params, 1)?;
            match param_value(&params[0], state)? {
                Value::Array(items) => Ok(Value::from(items.len())),
                Value::Object(map) => Ok(Value::from(map.len())),
                Value::String(s) => Ok(Value::from(s.chars().count())),
                _ => Err(Error::type_mismatch(&params[0], "array, object or string")),
            }
        }
        "addDuration" => {
            expect_params(name, &params, 2)?;
            let date = timestamp_param(&params[0], state)?;
            let duration = parse_duration(&string_param(name, &params[1], state)?)?;
            let shifted = date.checked_add_signed(duration).ok_or_else(|| {
                Error::InvalidFunctionArgs {
                    function: name.to_string(),
                    reason: "timestamp out of range".to_string(),
                }
            })?;
            Ok(Value::String(format_timestamp(shifted)))
        }
        "roundUpDate" => {
            expect_params(name, &params, 2)?;
            let date = timestamp_param(&params[0], state)?;
            let unit = string_param(name, &params[1], state)?;
            Ok(Value::String(format_timestamp(truncate(date, &unit)?)))
        }
        other => Err(Error::UnknownFunction {
            name: other.to_string(),
        }),
    }
}

fn expect_params(function: &str, params: &[String], count: usize) -> Result<()> {
    if params.len() == count {
        return Ok(());
    }
    Err(Error::InvalidFunctionArgs {
        function: function.to_string(),
        reason: format!("expected {count} argument(s), got {}", params.len()),
    })
}

/// 작은따옴표로 감싼 인자는 문자열 리터럴
fn param_value(raw: &str, state: &Map<String, Value>) -> Result<Value> {
    let quoted = raw
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''));
    match quoted {
        Some(literal) => Ok(Value::String(literal.to_string())),
        None => resolve_str(raw, state),
    }
}

fn string_param(function: &str, raw: &str, state: &Map<String, Value>) -> Result<String> {
    match param_value(raw, state)? {
        Value::String(s) => Ok(s),
        _ => Err(Error::InvalidFunctionArgs {
            function: function.to_string(),
            reason: format!("{raw} is not a string"),
        }),
    }
}

fn timestamp_param(raw: &str, state: &Map<String, Value>) -> Result<DateTime<Utc>> {
    match param_value(raw, state)? {
        Value::String(s) => parse_timestamp(&s),
        _ => Err(Error::InvalidTimestamp {
            value: raw.to_string(),
        }),
    }
}

fn truncate(date: DateTime<Utc>, unit: &str) -> Result<DateTime<Utc>> {
    let (month, day, hour, minute, second) = match unit {
        "year" => (1, 1, 0, 0, 0),
        "month" => (date.month(), 1, 0, 0, 0),
        "day" => (date.month(), date.day(), 0, 0, 0),
        "hour" => (date.month(), date.day(), date.hour(), 0, 0),
        "minute" => (date.month(), date.day(), date.hour(), date.minute(), 0),
        "second" => (date.month(), date.day(), date.hour(), date.minute(), date.second()),
        other => {
            return Err(Error::InvalidFunctionArgs {
                function: "roundUpDate".to_string(),
                reason: format!("unknown unit {other}"),
            })
        }
    };

    Utc.with_ymd_and_hms(date.year(), month, day, hour, minute, second)
        .single()
        .ok_or_else(|| Error::InvalidTimestamp {
            value: format_timestamp(date),
        })
}

/// `1h30m`, `-15m`, `1.5s` 형식의 기간 파싱
fn parse_duration(raw: &str) -> Result<Duration> {
    let invalid = || Error::InvalidFunctionArgs {
        function: "addDuration".to_string(),
        reason: format!("invalid duration {raw}"),
    };

    let (negative, mut rest) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    if rest == "0" {
        return Ok(Duration::zero());
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut nanos = 0f64;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_end == 0 {
            return Err(invalid());
        }
        let amount: f64 = rest[..number_end].parse().map_err(|_| invalid())?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        nanos += amount * scale;
        rest = &rest[unit_end..];
    }

    let nanos = nanos.round() as i64;
    Ok(Duration::nanoseconds(if negative { -nanos } else { nanos }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn state(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_non_strings_are_literals() {
        let s = state(json!({"args": {}}));
        assert_eq!(resolve(&json!(42), &s).unwrap(), json!(42));
        assert_eq!(resolve(&json!(["args.x"]), &s).unwrap(), json!(["args.x"]));
        assert_eq!(resolve(&json!(null), &s).unwrap(), json!(null));
    }

    #[test]
    fn test_rooted_paths() {
        let s = state(json!({
            "args": {"find": {"userId": "u1"}, "items": [10, 20]},
            "auth": {"id": "u1", "age": 30}
        }));
        assert_eq!(resolve_str("args.find.userId", &s).unwrap(), json!("u1"));
        assert_eq!(resolve_str("args.items.1", &s).unwrap(), json!(20));
        assert_eq!(resolve_str("auth.age", &s).unwrap(), json!(30));
        assert_eq!(resolve_str("admin", &s).unwrap(), json!("admin"));
    }

    #[test]
    fn test_path_errors() {
        let s = state(json!({"args": {"name": "x", "items": [1]}}));

        let err = resolve_str("args.missing", &s).unwrap_err();
        assert!(matches!(err, Error::PathNotFound { .. }));

        let err = resolve_str("args.name.first", &s).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));

        let err = resolve_str("args.items.5", &s).unwrap_err();
        assert!(matches!(err, Error::PathNotFound { .. }));

        // 결정 시점에는 res 루트가 없음
        let err = resolve_str("res.age", &s).unwrap_err();
        assert!(matches!(err, Error::PathNotFound { .. }));
    }

    #[test]
    fn test_bare_paths_fall_back_to_args() {
        let s = state(json!({"args": {"find": {"id": 7}}}));
        assert_eq!(resolve_str("find.id", &s).unwrap(), json!(7));
        assert_eq!(resolve_str("example.com", &s).unwrap(), json!("example.com"));
    }

    #[test]
    fn test_bracket_subscripts() {
        let s = state(json!({
            "args": {"roles": {"u1": "admin"}, "list": ["a", "b"]},
            "auth": {"id": "u1"}
        }));
        assert_eq!(resolve_str("args.roles[auth.id]", &s).unwrap(), json!("admin"));
        assert_eq!(resolve_str("args.list[1]", &s).unwrap(), json!("b"));
        assert!(resolve_str("args.roles[auth.missing]", &s).is_err());
    }

    #[test]
    fn test_store_creates_intermediate_objects() {
        let mut s = state(json!({"args": {}}));
        store_value("args.find.owner.id", json!("u1"), &mut s).unwrap();
        assert_eq!(s["args"], json!({"find": {"owner": {"id": "u1"}}}));

        store_value("args.find.owner.id", json!("u2"), &mut s).unwrap();
        assert_eq!(s["args"]["find"]["owner"]["id"], "u2");
    }

    #[test]
    fn test_store_into_array_and_scalar() {
        let mut s = state(json!({"args": {"list": [1, 2], "name": "x"}}));
        store_value("args.list.0", json!(9), &mut s).unwrap();
        assert_eq!(s["args"]["list"], json!([9, 2]));

        assert!(store_value("args.list.4", json!(9), &mut s).is_err());
        let err = store_value("args.name.first", json!(9), &mut s).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_delete_value() {
        let mut s = state(json!({"res": {"a": 1, "b": {"c": 2}}}));
        delete_value("res.b.c", &mut s).unwrap();
        assert_eq!(s["res"], json!({"a": 1, "b": {}}));

        let err = delete_value("res.b.c", &mut s).unwrap_err();
        assert!(matches!(err, Error::PathNotFound { .. }));
        assert!(delete_value("res.x.y", &mut s).is_err());
    }

    #[test]
    fn test_adjust_resolves_nested_strings() {
        let s = state(json!({"args": {"auth": {"id": "u1"}}}));
        let find = json!({"userId": "args.auth.id", "tags": ["args.missing", "plain"], "n": 3});
        assert_eq!(
            adjust(&find, &s),
            json!({"userId": "u1", "tags": ["args.missing", "plain"], "n": 3})
        );
    }

    #[test]
    fn test_utils_exists_and_length() {
        let s = state(json!({"args": {"list": [1, 2, 3], "doc": {"a": 1}}}));
        assert_eq!(resolve_str("utils.exists(args.list)", &s).unwrap(), json!(true));
        assert_eq!(resolve_str("utils.exists(args.nope)", &s).unwrap(), json!(false));
        assert_eq!(resolve_str("utils.length(args.list)", &s).unwrap(), json!(3));
        assert_eq!(resolve_str("utils.length(args.doc)", &s).unwrap(), json!(1));

        let err = resolve_str("utils.shout(args.list)", &s).unwrap_err();
        assert!(matches!(err, Error::UnknownFunction { .. }));
    }

    #[test]
    fn test_utils_dates() {
        let s = state(json!({"args": {"date": "2024-03-15T10:42:17Z"}}));
        assert_eq!(
            resolve_str("utils.addDuration(args.date, '1h30m')", &s).unwrap(),
            json!("2024-03-15T12:12:17Z")
        );
        assert_eq!(
            resolve_str("utils.addDuration(args.date, '-24h')", &s).unwrap(),
            json!("2024-03-14T10:42:17Z")
        );
        assert_eq!(
            resolve_str("utils.roundUpDate(args.date, 'day')", &s).unwrap(),
            json!("2024-03-15T00:00:00Z")
        );
        assert_eq!(
            resolve_str("utils.roundUpDate(args.date, 'month')", &s).unwrap(),
            json!("2024-03-01T00:00:00Z")
        );
        assert!(resolve_str("utils.addDuration(args.date, '1x')", &s).is_err());

        let now = resolve_str("utils.now()", &s).unwrap();
        assert!(parse_timestamp(now.as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(parse_timestamp("2024-01-02T03:04:05Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-02T05:04:05+02:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-02 03:04:05").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2024-01-02").unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
        );
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1h").unwrap(), Duration::hours(1));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::milliseconds(1500));
        assert_eq!(parse_duration("-2m").unwrap(), Duration::minutes(-2));
        assert_eq!(parse_duration("0").unwrap(), Duration::zero());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
    }
}
