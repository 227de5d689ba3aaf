//! API error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "Invalid request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", msg),
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "Internal error while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    "The request could not be processed".to_string(),
                )
            }
        };

        (status, Json(ErrorBody::new(error, message))).into_response()
    }
}

/// Flat error body shared by handler errors and pipeline rejections.
///
/// Every rejection this service produces carries at least an `error` label
/// and a human-readable `message`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
