//! 규칙 평가 컨텍스트
//!
//! 규칙에서 참조할 수 있는 상태를 담습니다.
//!
//! # 사용 가능한 루트
//!
//! - `args.*`: 요청 인자 (`args.token`, `args.auth`, `args.find` 등)
//! - `auth.*`: 검증된 토큰 claims (토큰을 검증하지 않은 경우 없음)
//! - `res.*`: 결과 문서 (후처리 시점에만 존재)

use serde_json::{Map, Value};
use tokio::time::Instant;

use super::resolve::{ROOT_ARGS, ROOT_AUTH};
use crate::auth::{self, Claims};

/// 규칙 평가 컨텍스트
///
/// 하나의 요청 평가 동안만 살아 있으며, `args` 아래 값은 Force/Remove 규칙에 의해 바뀔 수 있습니다.
#[derive(Debug, Clone)]
pub struct EvalContext {
    state: Map<String, Value>,
    deadline: Option<Instant>,
}

impl EvalContext {
    /// 요청 인자로 컨텍스트 생성
    pub fn new(args: Map<String, Value>) -> Self {
        let mut state = Map::new();
        state.insert(ROOT_ARGS.to_string(), Value::Object(args));
        Self {
            state,
            deadline: None,
        }
    }

    /// 호출자 토큰 설정 (`args.token`)
    pub fn with_token(mut self, token: &str) -> Self {
        self.args_mut()
            .insert("token".to_string(), Value::String(token.to_string()));
        self
    }

    /// 검증된 claims 설정 (`auth`, `args.auth`)
    pub fn with_claims(mut self, claims: Option<Claims>) -> Self {
        if let Some(claims) = claims {
            self.args_mut()
                .insert(ROOT_AUTH.to_string(), Value::Object(claims.clone()));
            self.state
                .insert(ROOT_AUTH.to_string(), Value::Object(claims));
        }
        self
    }

    /// 외부 호출 마감 시각 설정
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// 요청 인자
    pub fn args(&self) -> &Map<String, Value> {
        match self.state.get(ROOT_ARGS) {
            Some(Value::Object(args)) => args,
            _ => empty_map(),
        }
    }

    pub fn args_mut(&mut self) -> &mut Map<String, Value> {
        let slot = self
            .state
            .entry(ROOT_ARGS)
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(args) => args,
            _ => unreachable!("args root was just replaced with an object"),
        }
    }

    /// 평가가 끝난 요청 인자를 꺼냄
    pub fn into_args(mut self) -> Map<String, Value> {
        match self.state.remove(ROOT_ARGS) {
            Some(Value::Object(args)) => args,
            _ => Map::new(),
        }
    }

    /// 검증된 claims
    pub fn claims(&self) -> Option<&Claims> {
        self.state.get(ROOT_AUTH).and_then(Value::as_object)
    }

    /// 호출자 토큰
    pub fn token(&self) -> Option<&str> {
        self.args().get("token").and_then(Value::as_str)
    }

    /// 내부 호출자인지 확인
    pub fn is_internal(&self) -> bool {
        self.claims().map_or(false, auth::is_internal)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 값 해석에 사용하는 전체 상태
    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.state
    }

    /// Or 규칙에서 실패한 clause의 변경을 되돌리기 위한 스냅샷
    pub(crate) fn snapshot(&self) -> Map<String, Value> {
        self.state.clone()
    }

    pub(crate) fn restore(&mut self, snapshot: Map<String, Value>) {
        self.state = snapshot;
    }
}

fn empty_map() -> &'static Map<String, Value> {
    static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
    EMPTY.get_or_init(Map::new)
}
