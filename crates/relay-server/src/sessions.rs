//! Logical sessions and their last-activity clock.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use relay_core::{ConnectionId, Session, SessionId, UserId};
use tokio::time::Instant;
use tracing::debug;

/// Tracks sessions independently of the connections bound to them.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Session>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `id`, or rebind an existing `id` to `connection_id` and touch it.
    ///
    /// An existing session keeps its creator as `user_id`.
    pub fn create_or_join(
        &self,
        id: SessionId,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Session {
        let now = Instant::now();
        match self.sessions.entry(id) {
            Entry::Occupied(mut slot) => {
                let session = slot.get_mut();
                session.connection_id = connection_id;
                session.touch(now);
                debug!(session_id = %session.id, "session rejoined");
                session.clone()
            }
            Entry::Vacant(slot) => {
                let session = Session::new(slot.key().clone(), user_id, connection_id, now);
                debug!(session_id = %session.id, "session created");
                slot.insert(session).clone()
            }
        }
    }

    /// Refresh activity. A missing session is ignored.
    pub fn touch(&self, id: &SessionId) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut session) => {
                session.touch(Instant::now());
                true
            }
            None => false,
        }
    }

    /// Remove every session idle for at least `ttl` as of now.
    pub fn expire_older_than(&self, ttl: Duration) -> Vec<SessionId> {
        self.expire_older_than_at(Instant::now(), ttl)
    }

    /// Remove every session idle for at least `ttl` as of `now`.
    ///
    /// The check runs under each shard's write lock, so a session touched
    /// concurrently is never removed with a fresh `last_activity`.
    pub fn expire_older_than_at(&self, now: Instant, ttl: Duration) -> Vec<SessionId> {
        self.expire_with(now, ttl, |_| {})
    }

    /// Like [`expire_older_than_at`](Self::expire_older_than_at), but runs
    /// `unwind` on each expired session before its shard lock is released.
    ///
    /// A `create_or_join` for the same id blocks until `unwind` returns, so
    /// it never observes a half-cleaned session. `unwind` must not call back
    /// into this registry.
    pub fn expire_with<F>(&self, now: Instant, ttl: Duration, mut unwind: F) -> Vec<SessionId>
    where
        F: FnMut(&Session),
    {
        let mut expired = Vec::new();
        self.sessions.retain(|id, session| {
            let keep = session.idle_for(now) < ttl;
            if !keep {
                unwind(session);
                expired.push(id.clone());
            }
            keep
        });
        expired.sort();
        expired
    }

    /// Remove `id`. Idempotent.
    pub fn remove(&self, id: &SessionId) -> Option<Session> {
        self.sessions.remove(id).map(|(_, s)| s)
    }

    /// Remove `id` only if it is still bound to `connection_id`.
    pub fn remove_if_bound(&self, id: &SessionId, connection_id: &ConnectionId) -> bool {
        self.sessions
            .remove_if(id, |_, s| &s.connection_id == connection_id)
            .is_some()
    }

    /// Remove every session bound to `connection_id`.
    pub fn remove_bound_to(&self, connection_id: &ConnectionId) -> Vec<SessionId> {
        let mut removed = Vec::new();
        self.sessions.retain(|id, s| {
            let owned = &s.connection_id == connection_id;
            if owned {
                removed.push(id.clone());
            }
            !owned
        });
        removed
    }

    /// Snapshot of one session.
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    /// Live session count.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
