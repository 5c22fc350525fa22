//! WebSocket transport: socket I/O around the [`EventRouter`](crate::router::EventRouter).

pub mod session;

pub use session::run_ws_session;
