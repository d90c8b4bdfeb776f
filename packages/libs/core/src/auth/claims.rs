//! 토큰 Claims
//!
//! claims는 스키마가 고정되어 있지 않은 JSON 객체입니다. 규칙에서 `auth.<field>`로 참조합니다.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// 검증된 토큰의 claims
pub type Claims = Map<String, Value>;

/// 내부 서비스 호출자 ID
pub const INTERNAL_USER_ID: &str = "internal-sc-user";

/// 서비스 토큰의 role
pub const SERVICE_ROLE: &str = "SpaceCloud";

/// 내부 호출자인지 확인
pub fn is_internal(claims: &Claims) -> bool {
    claims.get("id").and_then(Value::as_str) == Some(INTERNAL_USER_ID)
}

/// 만료 여부 확인
///
/// `exp`는 unix 초(숫자) 또는 RFC3339 문자열을 허용합니다. `exp`가 없으면 만료되지 않은 것으로 봅니다.
pub fn is_expired(claims: &Claims) -> bool {
    match claims.get("exp") {
        Some(Value::Number(exp)) => exp
            .as_f64()
            .map_or(false, |exp| exp < Utc::now().timestamp() as f64),
        Some(Value::String(exp)) => DateTime::parse_from_rfc3339(exp)
            .map_or(true, |exp| exp.with_timezone(&Utc) < Utc::now()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Claims {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_is_internal() {
        assert!(is_internal(&claims(json!({"id": INTERNAL_USER_ID}))));
        assert!(!is_internal(&claims(json!({"id": "user_1"}))));
        assert!(!is_internal(&Claims::new()));
    }

    #[test]
    fn test_is_expired() {
        let past = Utc::now().timestamp() - 60;
        let future = Utc::now().timestamp() + 3600;

        assert!(is_expired(&claims(json!({"exp": past}))));
        assert!(!is_expired(&claims(json!({"exp": future}))));
        assert!(is_expired(&claims(json!({"exp": "2000-01-01T00:00:00Z"}))));
        assert!(!is_expired(&claims(json!({"id": "user_1"}))));
    }
}
