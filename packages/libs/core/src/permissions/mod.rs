//! 보안 규칙 평가 및 결과 후처리
//!
//! # 개요
//!
//! 요청마다 보안 정책에서 규칙을 찾아 평가합니다. 평가는 허용/거부를 결정하고,
//! 결과 문서에 적용할 후처리 액션 목록을 만들어 냅니다.
//!
//! # 모듈 구조
//!
//! - `rule`: 규칙 모델 (JSON/YAML 형식)
//! - `policy`: 리소스별 규칙 테이블
//! - `context`: 평가 컨텍스트 (`args`, `auth`)
//! - `resolve`: 값 참조 해석과 경로 읽기/쓰기/삭제
//! - `compare`: 타입별 값 비교
//! - `evaluator`: 규칙 평가기
//! - `actions`: 후처리 액션
//! - `post_process`: 결과 문서에 액션 적용
//! - `module`: 설정과 협력자를 묶은 진입점
//! - `operations`: CRUD/함수/파일/이벤트 권한 확인

mod actions;
mod compare;
mod context;
mod evaluator;
mod module;
mod operations;
mod policy;
mod post_process;
mod resolve;
mod rule;

pub use actions::{ActionKind, DeferredAction, DeferredActions};
pub use compare::compare;
pub use context::EvalContext;
pub use evaluator::RuleEvaluator;
pub use module::{ModuleConfig, PolicyModule};
pub use operations::{
    AggregateRequest, CreateRequest, DeleteRequest, ReadRequest, UpdateRequest,
};
pub use policy::{
    CollectionRules, DatabaseRules, FileOperation, FileRule, Operation, SecurityPolicy,
    ServiceRules, DEFAULT_KEY,
};
pub use post_process::apply as apply_post_process;
pub use resolve::{
    adjust, delete_value, load_value, parse_timestamp, resolve, resolve_str, store_value,
    ROOT_ARGS, ROOT_AUTH, ROOT_RES,
};
pub use rule::{
    CompareType, ForceRule, MatchRule, Operator, QueryRule, Reference, RemoveRule, Rule,
};
