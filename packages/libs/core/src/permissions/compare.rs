//! 타입 비교기
//!
//! Match 규칙의 두 피연산자를 해석하고 지정된 타입으로 강제 변환한 뒤 비교합니다.
//!
//! | 타입 | 허용 연산자 |
//! |------|-------------|
//! | string | `==`, `!=`, `in`, `notin` |
//! | number | 전체 |
//! | bool | `==`, `!=` (나머지는 `IncorrectRuleFieldType`) |
//! | date | `==`, `!=`, `>`, `>=`, `<`, `<=` |

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::resolve::{parse_timestamp, resolve};
use super::rule::{CompareType, Operator, Reference};
use crate::error::{Error, Result};

/// 두 참조를 비교
///
/// 비교가 거짓이거나 연산자가 타입에 맞지 않으면 `IncorrectMatch`,
/// 피연산자를 타입으로 변환할 수 없으면 `IncorrectRuleFieldType`입니다.
pub fn compare(
    compare_type: CompareType,
    operator: Operator,
    left: &Reference,
    right: &Reference,
    state: &Map<String, Value>,
) -> Result<()> {
    let left = resolve(left.as_value(), state)?;
    let right = resolve(right.as_value(), state)?;

    let matched = match compare_type {
        CompareType::String => {
            let left = as_string(&left).ok_or_else(|| Error::field_type("f1"))?;
            match operator {
                Operator::In | Operator::NotIn => {
                    membership(operator, contains(&right, state, |v| as_string(v) == Some(left))?)
                }
                Operator::Eq => left == as_string(&right).ok_or_else(|| Error::field_type("f2"))?,
                Operator::Ne => left != as_string(&right).ok_or_else(|| Error::field_type("f2"))?,
                _ => false,
            }
        }
        CompareType::Number => {
            let left = as_number(&left).ok_or_else(|| Error::field_type("f1"))?;
            match operator {
                Operator::In | Operator::NotIn => {
                    membership(operator, contains(&right, state, |v| as_number(v) == Some(left))?)
                }
                _ => {
                    let right = as_number(&right).ok_or_else(|| Error::field_type("f2"))?;
                    ordered(operator, left.partial_cmp(&right))
                }
            }
        }
        CompareType::Bool => {
            let left = left.as_bool().ok_or_else(|| Error::field_type("f1"))?;
            let right = right.as_bool().ok_or_else(|| Error::field_type("f2"))?;
            match operator {
                Operator::Eq => left == right,
                Operator::Ne => left != right,
                _ => return Err(Error::field_type("eval")),
            }
        }
        CompareType::Date => match operator {
            Operator::In | Operator::NotIn => false,
            _ => {
                let left = as_date(&left).ok_or_else(|| Error::field_type("f1"))?;
                let right = as_date(&right).ok_or_else(|| Error::field_type("f2"))?;
                ordered(operator, left.partial_cmp(&right))
            }
        },
    };

    if matched {
        Ok(())
    } else {
        tracing::debug!(?compare_type, %operator, "match rule not satisfied");
        Err(Error::IncorrectMatch)
    }
}

fn as_string(value: &Value) -> Option<&str> {
    value.as_str()
}

fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn as_date(value: &Value) -> Option<DateTime<Utc>> {
    value.as_str().and_then(|raw| parse_timestamp(raw).ok())
}

/// 배열 원소를 각각 해석해서 하나라도 조건을 만족하는지 확인
///
/// 타입이 맞지 않는 원소는 건너뜁니다.
fn contains(
    list: &Value,
    state: &Map<String, Value>,
    matches: impl Fn(&Value) -> bool,
) -> Result<bool> {
    let Value::Array(items) = list else {
        return Err(Error::field_type("f2"));
    };

    for item in items {
        if matches(&resolve(item, state)?) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn membership(operator: Operator, found: bool) -> bool {
    match operator {
        Operator::In => found,
        _ => !found,
    }
}

fn ordered(operator: Operator, ordering: Option<std::cmp::Ordering>) -> bool {
    use std::cmp::Ordering::*;

    let Some(ordering) = ordering else {
        return false;
    };
    match operator {
        Operator::Eq => ordering == Equal,
        Operator::Ne => ordering != Equal,
        Operator::Gt => ordering == Greater,
        Operator::Gte => ordering != Less,
        Operator::Lt => ordering == Less,
        Operator::Lte => ordering != Greater,
        Operator::In | Operator::NotIn => false,
    }
}
