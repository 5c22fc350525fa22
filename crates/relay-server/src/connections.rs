//! Live connection records and their identity/session binding.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use relay_core::{
    Connection, ConnectionId, ConnectionMetadata, RelayError, Result, RoomKey, SessionId,
    TransportId, UserId,
};
use tracing::{debug, info};

use crate::rooms::RoomBroadcaster;

/// Tracks every live connection.
///
/// Records are keyed by [`ConnectionId`]. A secondary index rejects a second
/// registration for the same transport id.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    by_transport: DashMap<TransportId, ConnectionId>,
    rooms: Arc<RoomBroadcaster>,
}

impl ConnectionRegistry {
    /// Empty registry. `authenticate` joins user rooms on `rooms`.
    pub fn new(rooms: Arc<RoomBroadcaster>) -> Self {
        Self {
            connections: DashMap::new(),
            by_transport: DashMap::new(),
            rooms,
        }
    }

    /// Create a record for a new transport link.
    pub fn register(
        &self,
        transport_id: TransportId,
        metadata: ConnectionMetadata,
    ) -> Result<ConnectionId> {
        let slot = match self.by_transport.entry(transport_id.clone()) {
            Entry::Occupied(_) => {
                return Err(RelayError::DuplicateConnection(transport_id.into_inner()));
            }
            Entry::Vacant(slot) => slot,
        };
        let connection = Connection::new(transport_id, metadata);
        let id = connection.id.clone();
        let _ = self.connections.insert(id.clone(), connection);
        let _ = slot.insert(id.clone());
        debug!(connection_id = %id, "connection registered");
        Ok(id)
    }

    /// Attach `user_id` and join the connection to `user:<user_id>`.
    ///
    /// Re-authenticating as a different user leaves the previous user room.
    pub fn authenticate(&self, id: &ConnectionId, user_id: UserId) -> Result<Connection> {
        let (connection, previous) = {
            let mut entry = self
                .connections
                .get_mut(id)
                .ok_or_else(|| RelayError::not_found("connection", id.as_str()))?;
            let previous = entry.user_id.replace(user_id.clone());
            entry.authenticated_at = Some(Utc::now());
            (entry.clone(), previous)
        };

        if let Some(previous) = previous.filter(|p| *p != user_id) {
            self.rooms.leave(id, &RoomKey::user(&previous));
        }
        let _ = self.rooms.join(id, RoomKey::user(&user_id));
        info!(connection_id = %id, user_id = %user_id, "user authenticated");
        Ok(connection)
    }

    /// Record that the connection joined `session_id`.
    pub fn bind_session(&self, id: &ConnectionId, session_id: SessionId) -> Result<()> {
        let mut entry = self
            .connections
            .get_mut(id)
            .ok_or_else(|| RelayError::not_found("connection", id.as_str()))?;
        entry.session_id = Some(session_id);
        Ok(())
    }

    /// Clear the binding of every connection bound to `session_id`.
    /// Returns the affected connection ids.
    pub fn detach_session(&self, session_id: &SessionId) -> Vec<ConnectionId> {
        let mut detached = Vec::new();
        for mut entry in self.connections.iter_mut() {
            if entry.session_id.as_ref() == Some(session_id) {
                entry.session_id = None;
                detached.push(entry.id.clone());
            }
        }
        detached
    }

    /// Remove and return the record.
    pub fn unregister(&self, id: &ConnectionId) -> Result<Connection> {
        let (_, connection) = self
            .connections
            .remove(id)
            .ok_or_else(|| RelayError::not_found("connection", id.as_str()))?;
        let _ = self
            .by_transport
            .remove_if(&connection.transport_id, |_, owner| owner == id);
        debug!(connection_id = %id, "connection unregistered");
        Ok(connection)
    }

    /// Snapshot of one record.
    pub fn lookup(&self, id: &ConnectionId) -> Result<Connection> {
        self.connections
            .get(id)
            .map(|c| c.value().clone())
            .ok_or_else(|| RelayError::not_found("connection", id.as_str()))
    }

    /// Live connection count.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are live.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    use crate::outbox::Outbox;

    fn registry() -> (ConnectionRegistry, Arc<RoomBroadcaster>) {
        let rooms = Arc::new(RoomBroadcaster::new());
        (ConnectionRegistry::new(Arc::clone(&rooms)), rooms)
    }

    fn connect(reg: &ConnectionRegistry, rooms: &RoomBroadcaster, transport: &str) -> ConnectionId {
        let id = reg
            .register(TransportId::from(transport), ConnectionMetadata::default())
            .unwrap();
        let (outbox, _rx) = Outbox::channel(8);
        rooms.attach(id.clone(), Arc::new(outbox));
        id
    }

    #[test]
    fn register_and_lookup() {
        let (reg, _rooms) = registry();
        let meta = ConnectionMetadata {
            user_agent: Some("test/1.0".into()),
            remote_addr: None,
        };
        let id = reg.register(TransportId::from("sock-1"), meta).unwrap();
        let conn = reg.lookup(&id).unwrap();
        assert_eq!(conn.transport_id.as_str(), "sock-1");
        assert_eq!(conn.metadata.user_agent.as_deref(), Some("test/1.0"));
        assert!(!conn.is_authenticated());
        assert!(conn.session_id.is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn duplicate_transport_is_rejected() {
        let (reg, _rooms) = registry();
        let _ = reg
            .register(TransportId::from("sock-1"), ConnectionMetadata::default())
            .unwrap();
        let err = reg
            .register(TransportId::from("sock-1"), ConnectionMetadata::default())
            .unwrap_err();
        assert_matches!(err, RelayError::DuplicateConnection(t) if t == "sock-1");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn transport_is_reusable_after_unregister() {
        let (reg, _rooms) = registry();
        let id = reg
            .register(TransportId::from("sock-1"), ConnectionMetadata::default())
            .unwrap();
        let _ = reg.unregister(&id).unwrap();
        assert!(
            reg.register(TransportId::from("sock-1"), ConnectionMetadata::default())
                .is_ok()
        );
    }

    #[test]
    fn authenticate_sets_identity_and_joins_user_room() {
        let (reg, rooms) = registry();
        let id = connect(&reg, &rooms, "sock-1");
        let conn = reg.authenticate(&id, UserId::from("u1")).unwrap();
        assert_eq!(conn.user_id.as_ref().map(UserId::as_str), Some("u1"));
        assert!(conn.authenticated_at.is_some());
        assert!(rooms.is_member(&id, &RoomKey::user(&UserId::from("u1"))));
    }

    #[test]
    fn reauthenticate_moves_user_room() {
        let (reg, rooms) = registry();
        let id = connect(&reg, &rooms, "sock-1");
        let _ = reg.authenticate(&id, UserId::from("u1")).unwrap();
        let _ = reg.authenticate(&id, UserId::from("u2")).unwrap();
        assert_eq!(rooms.rooms_of(&id), vec![RoomKey::user(&UserId::from("u2"))]);
    }

    #[test]
    fn unknown_connection_is_not_found() {
        let (reg, _rooms) = registry();
        let ghost = ConnectionId::from("ghost");
        assert!(reg.authenticate(&ghost, UserId::from("u1")).unwrap_err().is_not_found());
        assert!(reg.bind_session(&ghost, SessionId::from("s1")).unwrap_err().is_not_found());
        assert!(reg.lookup(&ghost).unwrap_err().is_not_found());
        assert!(reg.unregister(&ghost).unwrap_err().is_not_found());
    }

    #[test]
    fn unregister_returns_record_once() {
        let (reg, rooms) = registry();
        let id = connect(&reg, &rooms, "sock-1");
        reg.bind_session(&id, SessionId::from("s1")).unwrap();
        let conn = reg.unregister(&id).unwrap();
        assert_eq!(conn.session_id.as_ref().map(SessionId::as_str), Some("s1"));
        assert!(reg.unregister(&id).unwrap_err().is_not_found());
        assert!(reg.is_empty());
    }

    #[test]
    fn detach_session_clears_only_matching() {
        let (reg, rooms) = registry();
        let a = connect(&reg, &rooms, "a");
        let b = connect(&reg, &rooms, "b");
        let c = connect(&reg, &rooms, "c");
        reg.bind_session(&a, SessionId::from("s1")).unwrap();
        reg.bind_session(&b, SessionId::from("s1")).unwrap();
        reg.bind_session(&c, SessionId::from("s2")).unwrap();

        let mut detached = reg.detach_session(&SessionId::from("s1"));
        detached.sort();
        let mut expected = vec![a.clone(), b];
        expected.sort();
        assert_eq!(detached, expected);
        assert!(reg.lookup(&a).unwrap().session_id.is_none());
        assert!(reg.lookup(&c).unwrap().session_id.is_some());
    }
}
