//! Bridge 에러 타입

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// 거부 응답에 사용하는 기본 메시지 (규칙 내용은 노출하지 않음)
const ACCESS_DENIED: &str = "access denied";

/// Bridge 에러
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("bad request: {message}")]
    BadRequest { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("core error: {0}")]
    Core(#[from] stk_core::Error),
}

/// 에러 응답 JSON
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            BridgeError::BadRequest { message } => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", message.clone())
            }
            BridgeError::Internal { message } => {
                tracing::error!("Internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
            BridgeError::Core(e) => {
                let status = StatusCode::from_u16(e.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, e.code(), core_message(e, status))
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                request_id: crate::middleware::current_request_id(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// 거부 사유는 규칙 작성자가 지정한 메시지만 그대로 전달
fn core_message(e: &stk_core::Error, status: StatusCode) -> String {
    match (e, status) {
        (stk_core::Error::CustomMatch { message, .. }, _) => message.clone(),
        (_, StatusCode::FORBIDDEN) => {
            tracing::info!(code = e.code(), error = %e, "request denied");
            ACCESS_DENIED.to_string()
        }
        (_, status) if status.is_server_error() => {
            tracing::error!("Core error: {:?}", e);
            "Internal server error".to_string()
        }
        _ => e.to_string(),
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
