//! # relay-core
//!
//! Shared vocabulary for the relay crates:
//!
//! - **Branded IDs**: `ConnectionId`, `SessionId`, `UserId`, `TaskId`, ... as
//!   string newtypes so one kind of ID cannot be passed where another is expected
//! - **Records**: [`Connection`], [`Session`], [`Task`]
//! - **Rooms**: [`RoomKey`] with the `user:<id>` / `session:<id>` namespaces
//! - **Errors**: [`RelayError`] with stable machine-readable codes

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod rooms;
pub mod time;
pub mod types;

pub use errors::{RelayError, Result};
pub use ids::{AgentId, ConnectionId, MessageId, SessionId, TaskId, TransportId, UserId};
pub use rooms::RoomKey;
pub use types::{
    Connection, ConnectionMetadata, Session, Task, TaskPriority, TaskStatus, TaskType,
};
