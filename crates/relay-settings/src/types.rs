//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file only needs the keys it changes. Every struct implements [`Default`]
//! with the production values.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the relay service.
///
/// ```json
/// {
///   "server": { "port": 4000 },
///   "sessions": { "ttlSecs": 600 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Listener, CORS, and websocket transport.
    pub server: ServerSettings,
    /// Session expiry.
    pub sessions: SessionSettings,
    /// Task execution and handler collaborators.
    pub tasks: TaskSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject values that would make the service misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.server.outbound_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.outboundQueueCapacity must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_timeout_secs <= self.server.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatTimeoutSecs must exceed heartbeatIntervalSecs".into(),
            ));
        }
        if self.sessions.ttl_secs == 0 || self.sessions.sweep_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "sessions.ttlSecs and sessions.sweepIntervalSecs must be positive".into(),
            ));
        }
        if self.tasks.max_concurrent == 0 {
            return Err(SettingsError::InvalidValue(
                "tasks.maxConcurrent must be at least 1".into(),
            ));
        }
        if self.tasks.handler_timeout_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "tasks.handlerTimeoutSecs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Network listener and websocket transport settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Origins allowed by CORS.
    pub allowed_origins: Vec<String>,
    /// Per-connection outbound queue length.
    pub outbound_queue_capacity: usize,
    /// Seconds between websocket pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds without a pong before the socket is closed.
    pub heartbeat_timeout_secs: u64,
    /// Dropped messages after which a slow client is disconnected.
    pub max_client_drops: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3003,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            outbound_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_client_drops: 100,
        }
    }
}

impl ServerSettings {
    /// `host:port`, suitable for `TcpListener::bind`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Ping interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Pong timeout.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

/// Session expiry settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Idle time after which a session is expired.
    pub ttl_secs: u64,
    /// Seconds between sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 30 * 60,
            sweep_interval_secs: 5 * 60,
        }
    }
}

impl SessionSettings {
    /// Idle TTL.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Sweep interval.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Task execution settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskSettings {
    /// Tasks allowed to run at the same time.
    pub max_concurrent: usize,
    /// Upper bound for one handler invocation.
    pub handler_timeout_secs: u64,
    /// How long shutdown waits for in-flight tasks.
    pub drain_timeout_secs: u64,
    /// Root directory for `file_management` tasks.
    pub workspace_root: PathBuf,
    /// Completion collaborator used by `data_analysis` and `custom` tasks.
    pub completion: CompletionSettings,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            handler_timeout_secs: 60,
            drain_timeout_secs: 10,
            workspace_root: PathBuf::from("./workspace"),
            completion: CompletionSettings::default(),
        }
    }
}

impl TaskSettings {
    /// Handler timeout.
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }

    /// Shutdown drain window.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

/// Ollama-compatible chat endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionSettings {
    /// Base URL; `/api/chat` is appended.
    pub base_url: String,
    /// Model name sent with every request.
    pub model: String,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
