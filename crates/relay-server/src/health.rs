//! `/health` endpoint.

use std::sync::Arc;
use std::time::Instant;

use relay_core::time::timestamp;
use serde::Serialize;

use crate::connections::ConnectionRegistry;
use crate::sessions::SessionRegistry;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"healthy"` while the process is serving.
    pub status: &'static str,
    /// When the report was produced.
    pub timestamp: String,
    /// Live connection count.
    pub connections: usize,
    /// Live session count.
    pub sessions: usize,
    /// Seconds since start, fractional.
    pub uptime: f64,
}

/// Read-only view over the registries and the process start time.
#[derive(Clone)]
pub struct HealthReporter {
    connections: Arc<ConnectionRegistry>,
    sessions: Arc<SessionRegistry>,
    started: Instant,
}

impl HealthReporter {
    /// Reporter whose uptime counts from `started`.
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        sessions: Arc<SessionRegistry>,
        started: Instant,
    ) -> Self {
        Self {
            connections,
            sessions,
            started,
        }
    }

    /// Current snapshot.
    pub fn report(&self) -> HealthResponse {
        health_check(self.started, self.connections.len(), self.sessions.len())
    }
}

/// Build a health response from live counters.
pub fn health_check(started: Instant, connections: usize, sessions: usize) -> HealthResponse {
    HealthResponse {
        status: "healthy",
        timestamp: timestamp(),
        connections,
        sessions,
        uptime: started.elapsed().as_secs_f64(),
    }
}
