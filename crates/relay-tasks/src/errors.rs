//! Error types for task handlers and the task store.

use relay_core::{RelayError, TaskId};
use thiserror::Error;

/// What a [`TaskHandler`](crate::TaskHandler) returns when it cannot produce output.
///
/// The executor records the `Display` form as the failed task's `error`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The task input is missing a field or has the wrong shape.
    #[error("Invalid task input: {0}")]
    InvalidInput(String),
    /// The handler ran and failed.
    #[error("{0}")]
    Failed(String),
    /// A downstream service (completion, HTTP fetch) failed or timed out.
    #[error("{0}")]
    Collaborator(String),
}

impl HandlerError {
    /// Shorthand for [`HandlerError::InvalidInput`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl From<HandlerError> for RelayError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::InvalidInput(_) => RelayError::Validation(err.to_string()),
            HandlerError::Failed(msg) => RelayError::Handler(msg),
            HandlerError::Collaborator(msg) => RelayError::CollaboratorUnavailable(msg),
        }
    }
}

/// Task store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record for the id.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// The backing store failed.
    #[error("task store error: {0}")]
    Backend(String),
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => RelayError::not_found("task", id.as_str()),
            StoreError::Backend(msg) => RelayError::CollaboratorUnavailable(msg),
        }
    }
}
