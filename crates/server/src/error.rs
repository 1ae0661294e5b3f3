// crates/server/src/error.rs
//! `ApiError` (§7 taxonomy) — one variant per taxonomy entry, each mapped to
//! an HTTP status the same way `claude_view_server::error::ApiError` maps
//! its variants: `impl IntoResponse` logs via `tracing`, then returns
//! `(StatusCode, Json<ErrorResponse>)`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use scoutline_core::ExternalError;
use scoutline_search::SearchError;

/// Structured JSON error response for API errors.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}

/// API error types that map to HTTP status codes (§7 taxonomy).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("job not found: {0}")]
    JobNotFound(uuid::Uuid),

    #[error("dependency not configured: {0}")]
    ConfigError(String),

    #[error("upstream service error: {0}")]
    ExternalTransient(String),

    #[error("upstream service error: {0}")]
    ExternalPermanent(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::InvalidInput(msg) => {
                tracing::warn!(message = %msg, "invalid input");
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            ApiError::ProfileNotFound(account) => {
                tracing::info!(account = %account, "profile not found");
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ApiError::JobNotFound(id) => {
                tracing::info!(job_id = %id, "job not found");
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ApiError::ConfigError(msg) => {
                tracing::error!(message = %msg, "dependency not configured");
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone())
            }
            ApiError::ExternalTransient(msg) => {
                tracing::warn!(message = %msg, "transient upstream error");
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            ApiError::ExternalPermanent(msg) => {
                tracing::error!(message = %msg, "permanent upstream error");
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };
        (status, Json(ErrorResponse::new(detail))).into_response()
    }
}

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::ProfileNotFound => ApiError::ProfileNotFound("no such account".into()),
            SearchError::Config(msg) => ApiError::ConfigError(msg),
            SearchError::Backend(ext) => ext.into(),
        }
    }
}

impl From<ExternalError> for ApiError {
    fn from(e: ExternalError) -> Self {
        match e {
            ExternalError::Transient { .. } => ApiError::ExternalTransient(e.to_string()),
            ExternalError::Permanent { .. } => ApiError::ExternalPermanent(e.to_string()),
            ExternalError::NotConfigured { .. } => ApiError::ConfigError(e.to_string()),
            ExternalError::UnrecognizedRerankShape(_) => ApiError::ExternalPermanent(e.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
