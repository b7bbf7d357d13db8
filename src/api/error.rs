use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::errors::PipelineError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    RateLimited(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            ApiError::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, json!({ "error": msg })),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": msg })),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
        };
        (status, axum::Json(body)).into_response()
    }
}

/// The typed-error → HTTP translation: NotFound → 404, InvalidInput → 400,
/// Transient → 503, everything else → 500.
impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(msg) => ApiError::NotFound(msg),
            PipelineError::InvalidInput(msg) => ApiError::BadRequest(msg),
            PipelineError::Transient(msg) => ApiError::Unavailable(msg),
            PipelineError::Conflict(msg) => ApiError::Conflict(msg),
            PipelineError::Fatal(msg) => ApiError::Internal(msg),
        }
    }
}
