//! Branded ID newtypes.
//!
//! Connections, sessions, users, and tasks are all addressed by strings on the
//! wire. Wrapping each in its own newtype keeps a `SessionId` from being handed
//! to something that expects a `ConnectionId`.
//!
//! IDs generated by this process are UUID v7 (time-ordered). IDs that arrive
//! from clients (user, session, task) are accepted verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh ID (UUID v7).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Borrow the inner string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Process-unique identifier for a live connection, generated at connect time.
    ConnectionId
}

branded_id! {
    /// Opaque identifier assigned by the transport layer to one socket.
    TransportId
}

branded_id! {
    /// Identifier of a logical conversation session.
    SessionId
}

branded_id! {
    /// Identity attached to a connection by `authenticate`.
    UserId
}

branded_id! {
    /// Identifier of an asynchronous task.
    TaskId
}

branded_id! {
    /// Identifier of the agent a task or status update refers to.
    AgentId
}

branded_id! {
    /// Server-generated identifier of a relayed chat message.
    MessageId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_new_is_uuid_v7() {
        let id = ConnectionId::new();
        let parsed = Uuid::parse_str(id.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn client_supplied_ids_kept_verbatim() {
        let id = SessionId::from("s1");
        assert_eq!(id.as_str(), "s1");
        assert_eq!(id.to_string(), "s1");
        assert_eq!(String::from(id), "s1");
    }

    #[test]
    fn serde_is_transparent() {
        let id = UserId::from("u1");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""u1""#);
        let back: UserId = serde_json::from_str(r#""u1""#).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn deref_to_str() {
        let id = TaskId::from("t-42");
        assert!(id.starts_with("t-"));
    }
}
