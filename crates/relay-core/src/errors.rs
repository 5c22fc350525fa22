//! Error taxonomy shared by the registries, the router, and the executor.

use thiserror::Error;

/// Referenced record absent.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Transport id registered twice.
pub const DUPLICATE_CONNECTION: &str = "DUPLICATE_CONNECTION";
/// Task submitted while an execution for its id is in flight.
pub const ALREADY_RUNNING: &str = "ALREADY_RUNNING";
/// Task submitted after it already reached a terminal state.
pub const ALREADY_FINISHED: &str = "ALREADY_FINISHED";
/// Malformed inbound payload.
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
/// A task handler raised during execution.
pub const HANDLER_ERROR: &str = "HANDLER_ERROR";
/// A downstream service failed or timed out.
pub const COLLABORATOR_UNAVAILABLE: &str = "COLLABORATOR_UNAVAILABLE";

/// Errors raised by relay components.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A connection, session, or task was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up (`connection`, `session`, `task`).
        kind: &'static str,
        /// The id that missed.
        id: String,
    },

    /// The transport id already has a live connection.
    #[error("transport already registered: {0}")]
    DuplicateConnection(String),

    /// The task id already has an execution in flight.
    #[error("task already running: {0}")]
    AlreadyRunning(String),

    /// The task id already reached `completed` or `failed`.
    #[error("task already finished: {0}")]
    AlreadyFinished(String),

    /// Inbound payload failed validation.
    #[error("{0}")]
    Validation(String),

    /// A task handler failed.
    #[error("{0}")]
    Handler(String),

    /// A downstream collaborator failed or timed out.
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),
}

impl RelayError {
    /// Shorthand for [`RelayError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Machine-readable code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => NOT_FOUND,
            Self::DuplicateConnection(_) => DUPLICATE_CONNECTION,
            Self::AlreadyRunning(_) => ALREADY_RUNNING,
            Self::AlreadyFinished(_) => ALREADY_FINISHED,
            Self::Validation(_) => VALIDATION_ERROR,
            Self::Handler(_) => HANDLER_ERROR,
            Self::CollaboratorUnavailable(_) => COLLABORATOR_UNAVAILABLE,
        }
    }

    /// Whether the caller may treat this as a benign no-op.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
