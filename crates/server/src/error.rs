//! Error type returned by HTTP handlers.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use extractor::ExtractError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Error returned by handlers, rendered as `{"message": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request is malformed or refers to unusable input.
    #[error("{0}")]
    BadRequest(String),

    /// The request tried to reach outside the upload directory, or uploaded
    /// an archive that did.
    #[error("{0}")]
    Forbidden(String),

    /// The requested path does not exist.
    #[error("{0}")]
    NotFound(String),

    /// An uploaded archive exceeded a size limit.
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Anything else; details are logged, not returned.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal(detail) => {
                error!(error = %detail, "request failed");
                INTERNAL_MESSAGE.to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl From<ExtractError> for ApiError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Security(_) => ApiError::Forbidden(err.to_string()),
            ExtractError::SizeLimit(_) => ApiError::PayloadTooLarge(err.to_string()),
            ExtractError::Decode(_) => ApiError::BadRequest(err.to_string()),
            ExtractError::Filesystem { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}
