//! Server configuration.

use std::time::Duration;

use relay_settings::RelaySettings;

use crate::rooms::DEFAULT_MAX_DROPS;
use crate::sweeper::{DEFAULT_SESSION_TTL, DEFAULT_SWEEP_INTERVAL};

/// Runtime configuration for [`RelayServer`](crate::server::RelayServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Origins allowed by CORS.
    pub allowed_origins: Vec<String>,
    /// Per-connection outbound queue length.
    pub outbound_queue_capacity: usize,
    /// Interval between server Ping frames.
    pub heartbeat_interval: Duration,
    /// Close a client that has not answered for this long.
    pub heartbeat_timeout: Duration,
    /// Lifetime dropped frames before a client is evicted.
    pub max_client_drops: u64,
    /// Idle time after which a session is swept.
    pub session_ttl: Duration,
    /// Time between sweeps.
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            allowed_origins: vec!["http://localhost:3000".into()],
            outbound_queue_capacity: 256,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            max_client_drops: DEFAULT_MAX_DROPS,
            session_ttl: DEFAULT_SESSION_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl From<&RelaySettings> for ServerConfig {
    fn from(settings: &RelaySettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            allowed_origins: server.allowed_origins.clone(),
            outbound_queue_capacity: server.outbound_queue_capacity,
            heartbeat_interval: server.heartbeat_interval(),
            heartbeat_timeout: server.heartbeat_timeout(),
            max_client_drops: server.max_client_drops,
            session_ttl: settings.sessions.ttl(),
            sweep_interval: settings.sessions.sweep_interval(),
        }
    }
}

impl ServerConfig {
    /// `host:port` for the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_ephemeral_loopback() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr(), "127.0.0.1:0");
    }

    #[test]
    fn default_timings() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(cfg.heartbeat_timeout, Duration::from_secs(90));
        assert_eq!(cfg.session_ttl, Duration::from_secs(1800));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(300));
        assert_eq!(cfg.max_client_drops, 100);
    }

    #[test]
    fn from_settings_copies_every_field() {
        let mut settings = RelaySettings::default();
        settings.server.host = "0.0.0.0".into();
        settings.server.port = 4000;
        settings.server.allowed_origins = vec!["https://app.example".into()];
        settings.server.outbound_queue_capacity = 16;
        settings.sessions.ttl_secs = 60;
        settings.sessions.sweep_interval_secs = 5;

        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.listen_addr(), "0.0.0.0:4000");
        assert_eq!(cfg.allowed_origins, vec!["https://app.example".to_owned()]);
        assert_eq!(cfg.outbound_queue_capacity, 16);
        assert_eq!(cfg.session_ttl, Duration::from_secs(60));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(5));
    }
}
