//! Room membership and scoped fan-out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock;
use relay_core::{ConnectionId, RoomKey};
use tracing::{debug, warn};

use crate::metrics::WS_BROADCAST_DROPS_TOTAL;
use crate::outbox::Outbox;
use crate::protocol::OutboundEvent;

/// Lifetime drops after which a connection is evicted as a slow consumer.
pub const DEFAULT_MAX_DROPS: u64 = 100;

#[derive(Default)]
struct Membership {
    /// room → members
    rooms: HashMap<RoomKey, HashSet<ConnectionId>>,
    /// member → rooms, for `leave_all`
    joined: HashMap<ConnectionId, HashSet<RoomKey>>,
    /// Attached outboxes. Only attached connections may join rooms.
    outboxes: HashMap<ConnectionId, Arc<Outbox>>,
}

impl Membership {
    fn remove_member(&mut self, id: &ConnectionId, room: &RoomKey) {
        if let Some(members) = self.rooms.get_mut(room) {
            let _ = members.remove(id);
            if members.is_empty() {
                let _ = self.rooms.remove(room);
            }
        }
    }
}

/// Maps room keys to member connections and delivers events to them.
///
/// Membership edits and target collection happen under one lock. Frames are
/// queued after it is released, and queueing never waits.
pub struct RoomBroadcaster {
    state: RwLock<Membership>,
    max_drops: u64,
}

impl RoomBroadcaster {
    /// Broadcaster evicting after [`DEFAULT_MAX_DROPS`].
    pub fn new() -> Self {
        Self::with_max_drops(DEFAULT_MAX_DROPS)
    }

    /// Broadcaster evicting after `max_drops` lifetime drops.
    pub fn with_max_drops(max_drops: u64) -> Self {
        Self {
            state: RwLock::new(Membership::default()),
            max_drops,
        }
    }

    /// Make `id` reachable. Replaces any previous outbox for the same id.
    pub fn attach(&self, id: ConnectionId, outbox: Arc<Outbox>) {
        let _ = self.state.write().outboxes.insert(id, outbox);
    }

    /// Drop `id` from every room and forget its outbox.
    pub fn detach(&self, id: &ConnectionId) -> Option<Arc<Outbox>> {
        let mut state = self.state.write();
        if let Some(rooms) = state.joined.remove(id) {
            for room in &rooms {
                state.remove_member(id, room);
            }
        }
        state.outboxes.remove(id)
    }

    /// Add `id` to `room`. Idempotent. Returns `false` if `id` is not attached.
    pub fn join(&self, id: &ConnectionId, room: RoomKey) -> bool {
        let mut state = self.state.write();
        if !state.outboxes.contains_key(id) {
            return false;
        }
        let _ = state
            .joined
            .entry(id.clone())
            .or_default()
            .insert(room.clone());
        let _ = state.rooms.entry(room).or_default().insert(id.clone());
        true
    }

    /// Remove `id` from `room`. Idempotent.
    pub fn leave(&self, id: &ConnectionId, room: &RoomKey) {
        let mut state = self.state.write();
        if let Some(rooms) = state.joined.get_mut(id) {
            let _ = rooms.remove(room);
            if rooms.is_empty() {
                let _ = state.joined.remove(id);
            }
        }
        state.remove_member(id, room);
    }

    /// Remove `id` from every room it belongs to. The outbox stays attached.
    pub fn leave_all(&self, id: &ConnectionId) {
        let mut state = self.state.write();
        if let Some(rooms) = state.joined.remove(id) {
            for room in &rooms {
                state.remove_member(id, room);
            }
        }
    }

    /// Empty `room`. Returns the number of members removed.
    pub fn close_room(&self, room: &RoomKey) -> usize {
        let mut state = self.state.write();
        let Some(members) = state.rooms.remove(room) else {
            return 0;
        };
        for id in &members {
            if let Some(rooms) = state.joined.get_mut(id) {
                let _ = rooms.remove(room);
                if rooms.is_empty() {
                    let _ = state.joined.remove(id);
                }
            }
        }
        members.len()
    }

    /// Current members of `room`, sorted.
    pub fn members(&self, room: &RoomKey) -> Vec<ConnectionId> {
        let state = self.state.read();
        let mut members: Vec<ConnectionId> = state
            .rooms
            .get(room)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Whether `id` is in `room`.
    pub fn is_member(&self, id: &ConnectionId, room: &RoomKey) -> bool {
        self.state
            .read()
            .rooms
            .get(room)
            .is_some_and(|m| m.contains(id))
    }

    /// Rooms `id` belongs to, sorted.
    pub fn rooms_of(&self, id: &ConnectionId) -> Vec<RoomKey> {
        let state = self.state.read();
        let mut rooms: Vec<RoomKey> = state
            .joined
            .get(id)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    /// Attached connections.
    pub fn connection_count(&self) -> usize {
        self.state.read().outboxes.len()
    }

    /// Non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.state.read().rooms.len()
    }

    /// Deliver `event` to one connection. `false` if absent or not accepted.
    pub fn send_to(&self, id: &ConnectionId, event: &OutboundEvent) -> bool {
        let Some(frame) = encode(event) else {
            return false;
        };
        let outbox = self.state.read().outboxes.get(id).cloned();
        match outbox {
            Some(outbox) => self.deliver(id, &outbox, frame),
            None => false,
        }
    }

    /// Deliver `event` to every member of `room` except `exclude`.
    ///
    /// Returns the number of connections that accepted the frame. Members
    /// whose queue is full or closed are skipped.
    pub fn publish(
        &self,
        room: &RoomKey,
        event: &OutboundEvent,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        self.publish_many(std::slice::from_ref(room), event, exclude)
    }

    /// Deliver `event` once to every connection in the union of `rooms`,
    /// except `exclude`. A connection in several of the rooms gets one copy.
    pub fn publish_many(
        &self,
        rooms: &[RoomKey],
        event: &OutboundEvent,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };

        let targets: Vec<(ConnectionId, Arc<Outbox>)> = {
            let state = self.state.read();
            let mut seen = HashSet::new();
            rooms
                .iter()
                .filter_map(|room| state.rooms.get(room))
                .flatten()
                .filter(|id| Some(*id) != exclude && seen.insert(*id))
                .filter_map(|id| state.outboxes.get(id).map(|o| (id.clone(), Arc::clone(o))))
                .collect()
        };

        let delivered = targets
            .iter()
            .filter(|(id, outbox)| self.deliver(id, outbox, Arc::clone(&frame)))
            .count();
        debug!(
            event = event.name(),
            rooms = ?rooms.iter().map(RoomKey::as_str).collect::<Vec<_>>(),
            recipients = targets.len(),
            delivered,
            "published"
        );
        delivered
    }

    fn deliver(&self, id: &ConnectionId, outbox: &Outbox, frame: Arc<String>) -> bool {
        if outbox.send(frame) {
            return true;
        }
        counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
        let drops = outbox.drop_count();
        if drops >= self.max_drops && !outbox.is_evicted() {
            warn!(connection_id = %id, drops, "evicting slow consumer");
            outbox.evict();
        } else {
            debug!(connection_id = %id, drops, "skipped delivery");
        }
        false
    }
}

impl Default for RoomBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(event: &OutboundEvent) -> Option<Arc<String>> {
    match event.encode() {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(event = event.name(), error = %e, "failed to serialize event");
            None
        }
    }
}
