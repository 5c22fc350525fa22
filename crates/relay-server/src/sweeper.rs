//! Periodic removal of idle sessions.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use relay_core::{RoomKey, SessionId};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connections::ConnectionRegistry;
use crate::metrics::SESSIONS_EXPIRED_TOTAL;
use crate::rooms::RoomBroadcaster;
use crate::sessions::SessionRegistry;

/// Default idle time after which a session is removed.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Expires idle sessions and unwinds what pointed at them.
pub struct CleanupSweeper {
    sessions: Arc<SessionRegistry>,
    connections: Arc<ConnectionRegistry>,
    rooms: Arc<RoomBroadcaster>,
    ttl: Duration,
    interval: Duration,
}

impl CleanupSweeper {
    /// Sweeper with the default TTL and interval.
    pub fn new(
        sessions: Arc<SessionRegistry>,
        connections: Arc<ConnectionRegistry>,
        rooms: Arc<RoomBroadcaster>,
    ) -> Self {
        Self {
            sessions,
            connections,
            rooms,
            ttl: DEFAULT_SESSION_TTL,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Override the idle TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Override the sweep interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One pass as of now.
    pub fn sweep_once(&self) -> Vec<SessionId> {
        self.sweep_at(Instant::now())
    }

    /// One pass as of `now`. Returns the expired session ids.
    ///
    /// Bindings and room membership are unwound while the session record is
    /// still locked, so a concurrent `join_session` on the same id lands on a
    /// fresh session rather than one this pass is tearing down.
    pub fn sweep_at(&self, now: Instant) -> Vec<SessionId> {
        let expired = self.sessions.expire_with(now, self.ttl, |session| {
            let detached = self.connections.detach_session(&session.id);
            let members = self.rooms.close_room(&RoomKey::session(&session.id));
            info!(
                session_id = %session.id,
                detached = detached.len(),
                members,
                "cleaned up inactive session"
            );
        });
        if !expired.is_empty() {
            counter!(SESSIONS_EXPIRED_TOTAL).increment(expired.len() as u64);
        }
        expired
    }

    /// Sweep every interval until `shutdown` fires. The first pass runs one
    /// interval after start.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(ttl = ?self.ttl, interval = ?self.interval, "session sweeper started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let expired = self.sweep_once();
                    let remaining = self.sessions.len();
                    debug!(expired = expired.len(), remaining, "sweep finished");
                }
            }
        }
        debug!("session sweeper stopped");
    }
}
