/**
 * Routes Module
 * API route handlers and the shared JSON error shape
 */
pub mod components;
pub mod debug;
pub mod health;
pub mod modules;
pub mod pages;
pub mod projects;
pub mod render;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

pub const MISSING_FIELDS: &str = "缺少必要参数";
pub const SERVER_ERROR: &str = "服务器错误";
pub const PROJECT_NOT_FOUND: &str = "项目不存在";
pub const MODULE_NOT_FOUND: &str = "模块不存在";
pub const PAGE_NOT_FOUND: &str = "页面不存在";
pub const COMPONENT_NOT_FOUND: &str = "组件不存在";
pub const BODY_TOO_LARGE: &str = "请求体过大";

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Handler errors. Every variant renders as `{"error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("request body too large")]
    PayloadTooLarge,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.to_string()),
            ApiError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, BODY_TOO_LARGE.to_string()),
            ApiError::Store(e) => {
                tracing::error!(error = %e, "record store failure");
                (StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR.to_string())
            }
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "rejected request body");
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// A required string field: absent and empty are both missing.
pub fn required(field: Option<String>) -> ApiResult<String> {
    field
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::BadRequest(MISSING_FIELDS.to_string()))
}
