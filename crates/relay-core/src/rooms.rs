//! Room keys.
//!
//! A room is a named group of connections used for scoped fan-out. Two
//! namespaces exist: `user:<userId>` and `session:<sessionId>`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{SessionId, UserId};

/// Namespaced room key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomKey(String);

impl RoomKey {
    /// Per-user room: every connection authenticated as `user`.
    pub fn user(user: &UserId) -> Self {
        Self(format!("user:{user}"))
    }

    /// Per-session room: every connection that joined `session`.
    pub fn session(session: &SessionId) -> Self {
        Self(format!("session:{session}"))
    }

    /// The raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
