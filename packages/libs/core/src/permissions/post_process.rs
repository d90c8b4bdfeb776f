//! 결과 후처리
//!
//! 평가 단계에서 쌓인 액션을 실제 결과 문서에 적용합니다.
//! 결과는 `null`(아무것도 하지 않음), 객체 하나, 또는 객체 배열이어야 합니다.

use serde_json::{Map, Value};

use super::actions::{ActionKind, DeferredAction, DeferredActions};
use super::resolve::{delete_value, load_value, resolve, store_value, ROOT_RES};
use crate::crypto;
use crate::error::{Error, Result};

/// 결과 문서에 액션 목록을 순서대로 적용
///
/// 배열 결과는 원소마다 모든 액션을 적용합니다. 문서 하나에서 실패하면 그 자리에서 중단하며,
/// 이미 적용된 변경은 되돌리지 않습니다.
pub fn apply(actions: &DeferredActions, result: &mut Value, aes_key: Option<&[u8]>) -> Result<()> {
    match result {
        Value::Null => Ok(()),
        Value::Object(_) => apply_document(actions, result, aes_key),
        Value::Array(docs) => {
            if let Some(invalid) = docs.iter().find(|doc| !doc.is_object()) {
                return Err(Error::InvalidResultType {
                    found: format!("array containing {}", type_name(invalid)),
                });
            }
            docs.iter_mut()
                .try_for_each(|doc| apply_document(actions, doc, aes_key))
        }
        other => Err(Error::InvalidResultType {
            found: type_name(other).to_string(),
        }),
    }
}

fn apply_document(
    actions: &DeferredActions,
    doc: &mut Value,
    aes_key: Option<&[u8]>,
) -> Result<()> {
    let mut state = Map::new();
    state.insert(ROOT_RES.to_string(), std::mem::take(doc));

    let outcome = actions
        .iter()
        .try_for_each(|action| apply_action(action, &mut state, aes_key));

    *doc = state.remove(ROOT_RES).unwrap_or(Value::Null);

    if let Err(err) = &outcome {
        tracing::error!(error = %err, "failed to apply post-processing action");
    }
    outcome
}

fn apply_action(
    action: &DeferredAction,
    state: &mut Map<String, Value>,
    aes_key: Option<&[u8]>,
) -> Result<()> {
    let path = action.target_path.as_str();

    match action.kind {
        ActionKind::Force => {
            let value = action.value.clone().unwrap_or(Value::Null);
            let value = if action.deferred {
                resolve(&value, state).unwrap_or(value)
            } else {
                value
            };
            store_value(path, value, state)
        }
        ActionKind::Remove => delete_value(path, state),
        ActionKind::Encrypt => {
            let key = require_key(aes_key)?;
            let plain = load_string(path, state)?;
            store_value(path, Value::String(crypto::encrypt_string(key, &plain)?), state)
        }
        ActionKind::Decrypt => {
            let key = require_key(aes_key)?;
            let sealed = load_string(path, state)?;
            store_value(path, Value::String(crypto::decrypt_string(key, &sealed)?), state)
        }
        ActionKind::Hash => {
            let plain = load_string(path, state)?;
            store_value(path, Value::String(crypto::hash_string(&plain)), state)
        }
    }
}

pub(crate) fn load_string(path: &str, state: &Map<String, Value>) -> Result<String> {
    match load_value(path, state)? {
        Value::String(s) => Ok(s),
        _ => Err(Error::type_mismatch(path, "string")),
    }
}

pub(crate) fn require_key(aes_key: Option<&[u8]>) -> Result<&[u8]> {
    aes_key.ok_or_else(|| Error::NotConfigured {
        component: "aes key".to_string(),
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
