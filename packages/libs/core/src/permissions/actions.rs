//! 후처리 액션
//!
//! 규칙 평가 중 결과 문서(`res.*`)를 대상으로 한 Force/Remove/Encrypt/Decrypt/Hash는
//! 바로 실행하지 않고 액션 목록으로 쌓아 두었다가 결과가 나온 뒤 적용합니다.
//! 목록은 그대로 직렬화해서 다른 프로세스로 넘길 수 있습니다.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 액션 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Force,
    Remove,
    Encrypt,
    Decrypt,
    Hash,
}

/// 결과 문서에 적용할 액션 하나
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredAction {
    #[serde(rename = "action")]
    pub kind: ActionKind,

    /// `res.`로 시작하는 대상 경로
    #[serde(rename = "field")]
    pub target_path: String,

    /// Force 값
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// 결정 시점에 해석하지 못한 참조(예: `res.author.id`). 이 경우에만 결과 문서를 기준으로
    /// 다시 해석하고, 나머지 값은 그대로 씁니다.
    #[serde(default, skip_serializing_if = "is_false")]
    pub deferred: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl DeferredAction {
    pub fn new(kind: ActionKind, target_path: impl Into<String>) -> Self {
        Self {
            kind,
            target_path: target_path.into(),
            value: None,
            deferred: false,
        }
    }

    pub fn force(target_path: impl Into<String>, value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::new(ActionKind::Force, target_path)
        }
    }

    /// 결과 문서가 있어야 해석할 수 있는 참조를 Force 값으로 사용
    pub fn force_deferred(target_path: impl Into<String>, reference: Value) -> Self {
        Self {
            deferred: true,
            ..Self::force(target_path, reference)
        }
    }

    pub fn remove(target_path: impl Into<String>) -> Self {
        Self::new(ActionKind::Remove, target_path)
    }
}

/// 평가 결과로 쌓인 액션 목록 (순서 유지)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeferredActions(Vec<DeferredAction>);

impl DeferredActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: DeferredAction) {
        self.0.push(action);
    }

    /// 다른 목록을 뒤에 이어 붙임
    pub fn extend(&mut self, other: DeferredActions) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DeferredAction> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[DeferredAction] {
        &self.0
    }
}

impl From<Vec<DeferredAction>> for DeferredActions {
    fn from(actions: Vec<DeferredAction>) -> Self {
        Self(actions)
    }
}

impl FromIterator<DeferredAction> for DeferredActions {
    fn from_iter<I: IntoIterator<Item = DeferredAction>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for DeferredActions {
    type Item = DeferredAction;
    type IntoIter = std::vec::IntoIter<DeferredAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a DeferredActions {
    type Item = &'a DeferredAction;
    type IntoIter = std::slice::Iter<'a, DeferredAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
