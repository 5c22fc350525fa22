//! # relay-server
//!
//! Real-time coordination layer between clients and the task executor.
//!
//! - [`ConnectionRegistry`] and [`SessionRegistry`] track live sockets and
//!   collaborative sessions
//! - [`RoomBroadcaster`] fans events out to `user:<id>` and `session:<id>`
//!   rooms through bounded per-connection outboxes
//! - [`EventRouter`] validates inbound frames and applies their effects
//! - [`CleanupSweeper`] expires idle sessions
//! - [`RelayServer`] mounts `/ws`, `/health`, `/metrics`, and `/api/tasks` on
//!   axum

#![deny(unsafe_code)]

pub mod config;
pub mod connections;
pub mod health;
pub mod http;
pub mod metrics;
pub mod notifier;
pub mod outbox;
pub mod protocol;
pub mod rooms;
pub mod router;
pub mod server;
pub mod sessions;
pub mod shutdown;
pub mod sweeper;
pub mod websocket;

pub use config::ServerConfig;
pub use connections::ConnectionRegistry;
pub use health::{HealthReporter, HealthResponse};
pub use notifier::RoomNotifier;
pub use outbox::Outbox;
pub use protocol::{InboundEvent, OutboundEvent};
pub use rooms::RoomBroadcaster;
pub use router::{EventRouter, Flow};
pub use server::RelayServer;
pub use sessions::SessionRegistry;
pub use shutdown::ShutdownCoordinator;
pub use sweeper::CleanupSweeper;
