//! 공통 에러 타입
//!
//! 보안 규칙 평가와 결과 후처리에서 사용되는 에러 타입을 정의합니다.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Santokit 보안 규칙 엔진 에러
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────────
    // Rule Errors
    // ─────────────────────────────────────────────────────────────────────────────
    #[error("no rule found for {resource}")]
    RuleNotFound { resource: String },

    #[error("incorrect rule provided")]
    IncorrectRule,

    #[error("incorrect rule field type: {field}")]
    IncorrectRuleFieldType { field: String },

    #[error("the operation being performed is not allowed")]
    IncorrectMatch,

    #[error("none of the clauses matched")]
    NoClauseMatched,

    #[error("the operation being performed is denied")]
    OperationDenied,

    /// Match 규칙 작성자가 지정한 메시지. 원래 에러 종류는 `source`에 보존됩니다.
    #[error("{message}")]
    CustomMatch {
        message: String,
        #[source]
        source: Box<Error>,
    },

    // ─────────────────────────────────────────────────────────────────────────────
    // Auth / Tenant Errors
    // ─────────────────────────────────────────────────────────────────────────────
    #[error("token could not be verified: {reason}")]
    TokenVerificationFailed { reason: String },

    #[error("invalid project details provided: expected {expected}, got {actual}")]
    TenantMismatch { expected: String, actual: String },

    // ─────────────────────────────────────────────────────────────────────────────
    // Resolver Errors
    // ─────────────────────────────────────────────────────────────────────────────
    #[error("path not found: {path}")]
    PathNotFound { path: String },

    #[error("type mismatch at {path}: expected {expected}")]
    TypeMismatch { path: String, expected: String },

    #[error("unknown helper function: {name}")]
    UnknownFunction { name: String },

    #[error("invalid arguments for {function}: {reason}")]
    InvalidFunctionArgs { function: String, reason: String },

    #[error("invalid timestamp: {value}")]
    InvalidTimestamp { value: String },

    // ─────────────────────────────────────────────────────────────────────────────
    // Post-Processing Errors
    // ─────────────────────────────────────────────────────────────────────────────
    #[error("result is of invalid type: {found}")]
    InvalidResultType { found: String },

    #[error("crypto error: {message}")]
    Crypto { message: String },

    // ─────────────────────────────────────────────────────────────────────────────
    // Collaborator Errors
    // ─────────────────────────────────────────────────────────────────────────────
    #[error("webhook call to {url} failed: {message}")]
    Webhook { url: String, message: String },

    #[error("data store error: {message}")]
    DataStore { message: String },

    #[error("operation cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("{component} is not configured")]
    NotConfigured { component: String },

    // ─────────────────────────────────────────────────────────────────────────────
    // IO/Serialization Errors
    // ─────────────────────────────────────────────────────────────────────────────
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// 규칙 작성자 메시지로 감싼 에러라면 원래 에러를 반환
    pub fn kind(&self) -> &Error {
        match self {
            Error::CustomMatch { source, .. } => source.kind(),
            other => other,
        }
    }

    /// 평가 실패(거부)로 취급되는 에러인지 확인
    pub fn is_denial(&self) -> bool {
        self.status_code() == 403
    }

    /// HTTP 상태 코드로 변환
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            // 400 Bad Request
            Error::Yaml(_) | Error::Json(_) => 400,

            // 401 Unauthorized
            Error::TokenVerificationFailed { .. } => 401,

            // 404 Not Found
            Error::RuleNotFound { .. } => 404,

            // 408 Request Timeout
            Error::Cancelled { .. } => 408,

            // 500 Internal Server Error
            Error::InvalidResultType { .. }
            | Error::Crypto { .. }
            | Error::NotConfigured { .. } => 500,

            // 403 Forbidden: 규칙 평가 중 발생한 나머지 실패는 모두 접근 거부
            _ => 403,
        }
    }

    /// 에러 코드 (클라이언트용)
    pub fn code(&self) -> &'static str {
        match self.kind() {
            Error::RuleNotFound { .. } => "RULE_NOT_FOUND",
            Error::IncorrectRule => "INCORRECT_RULE",
            Error::IncorrectRuleFieldType { .. } => "INCORRECT_RULE_FIELD_TYPE",
            Error::IncorrectMatch => "INCORRECT_MATCH",
            Error::NoClauseMatched => "NO_CLAUSE_MATCHED",
            Error::OperationDenied => "OPERATION_DENIED",
            Error::TokenVerificationFailed { .. } => "TOKEN_VERIFICATION_FAILED",
            Error::TenantMismatch { .. } => "TENANT_MISMATCH",
            Error::PathNotFound { .. } => "PATH_NOT_FOUND",
            Error::TypeMismatch { .. } => "TYPE_MISMATCH",
            Error::UnknownFunction { .. } => "UNKNOWN_FUNCTION",
            Error::InvalidFunctionArgs { .. } => "INVALID_FUNCTION_ARGS",
            Error::InvalidTimestamp { .. } => "INVALID_TIMESTAMP",
            Error::InvalidResultType { .. } => "INVALID_RESULT_TYPE",
            Error::Crypto { .. } => "CRYPTO_ERROR",
            Error::Webhook { .. } => "WEBHOOK_FAILED",
            Error::DataStore { .. } => "DATA_STORE_ERROR",
            Error::Cancelled { .. } => "CANCELLED",
            Error::NotConfigured { .. } => "NOT_CONFIGURED",
            Error::Yaml(_) => "YAML_ERROR",
            Error::Json(_) => "JSON_ERROR",
            // kind()는 CustomMatch를 반환하지 않음
            Error::CustomMatch { .. } => "INCORRECT_MATCH",
        }
    }

    pub(crate) fn path_not_found(path: impl Into<String>) -> Self {
        Error::PathNotFound { path: path.into() }
    }

    pub(crate) fn type_mismatch(path: impl Into<String>, expected: impl Into<String>) -> Self {
        Error::TypeMismatch {
            path: path.into(),
            expected: expected.into(),
        }
    }

    pub(crate) fn field_type(field: impl Into<String>) -> Self {
        Error::IncorrectRuleFieldType {
            field: field.into(),
        }
    }

    pub(crate) fn crypto(message: impl Into<String>) -> Self {
        Error::Crypto {
            message: message.into(),
        }
    }
}
