//! JSON HTTP surface for tasks.

pub mod tasks;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_core::RelayError;
use serde_json::json;
use tracing::error;

/// Error body returned by the task routes: `{error, details?}`.
#[derive(Debug)]
pub enum ApiError {
    /// `400`, request failed validation.
    Validation {
        /// Short summary.
        error: String,
        /// One entry per failed field.
        details: Vec<String>,
    },
    /// `404`.
    NotFound(String),
    /// `409`, the executor refused the submission.
    Conflict(String),
    /// `500`.
    Internal(String),
}

impl ApiError {
    /// `400` with a single detail.
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::Validation {
            error: "Validation failed".into(),
            details: vec![detail.into()],
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::NotFound { .. } => Self::NotFound(err.to_string()),
            RelayError::AlreadyRunning(_) | RelayError::AlreadyFinished(_) => {
                Self::Conflict(err.to_string())
            }
            RelayError::Validation(msg) => Self::invalid(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation { error, details } => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": error, "details": details })),
            )
                .into_response(),
            Self::NotFound(msg) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": msg }))).into_response()
            }
            Self::Conflict(msg) => {
                (StatusCode::CONFLICT, Json(json!({ "error": msg }))).into_response()
            }
            Self::Internal(msg) => {
                error!(error = %msg, "task route failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
