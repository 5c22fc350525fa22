//! # relay-tasks
//!
//! Detached task execution for the relay service.
//!
//! - [`TaskExecutor`] owns the `pending → running → {completed, failed}`
//!   lifecycle and guarantees one execution per task id.
//! - [`HandlerTable`] maps each [`TaskType`](relay_core::TaskType) to a
//!   [`TaskHandler`]. [`handlers::builtin_handlers`] registers the five
//!   built-in ones.
//! - [`TaskStore`] and [`TaskNotifier`] are the seams to persistence and to
//!   room broadcast.

#![deny(unsafe_code)]

pub mod completion;
pub mod errors;
pub mod executor;
pub mod handler;
pub mod handlers;
pub mod notifier;
pub mod store;

pub use completion::{ChatMessage, CompletionClient, OllamaClient, Role};
pub use errors::{HandlerError, StoreError};
pub use executor::{ExecutorConfig, TaskExecutor};
pub use handler::{HandlerTable, TaskHandler};
pub use notifier::{NoopNotifier, TaskNotifier};
pub use store::{MemoryTaskStore, TaskStore};
