//! Inbound event dispatch.
//!
//! [`EventRouter`] turns each client frame into registry edits and room
//! publishes. Every handler converts its own failure into an error event for
//! the sender (interactive events) or a log line (fire-and-forget events), so
//! a bad frame never ends the connection's event loop.

use std::sync::Arc;

use metrics::counter;
use relay_core::{
    Connection, ConnectionId, ConnectionMetadata, RelayError, Result, RoomKey, SessionId,
    TransportId, UserId,
};
use tracing::{debug, info, warn};

use crate::connections::ConnectionRegistry;
use crate::metrics::{EVENT_ERRORS_TOTAL, EVENTS_RECEIVED_TOTAL};
use crate::outbox::Outbox;
use crate::protocol::{
    AgentStatusPayload, AuthenticatePayload, ChatMessagePayload, FileOperationPayload,
    FrameError, InboundEvent, JoinSessionPayload, OutboundEvent, TaskUpdatePayload,
    TypingPayload,
};
use crate::rooms::RoomBroadcaster;
use crate::sessions::SessionRegistry;

/// What the transport should do after an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading.
    Continue,
    /// The client asked to leave. Close the socket.
    Close,
}

/// Dispatches inbound events against the shared registries.
#[derive(Clone)]
pub struct EventRouter {
    connections: Arc<ConnectionRegistry>,
    sessions: Arc<SessionRegistry>,
    rooms: Arc<RoomBroadcaster>,
}

impl EventRouter {
    /// Router over the three shared components.
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        sessions: Arc<SessionRegistry>,
        rooms: Arc<RoomBroadcaster>,
    ) -> Self {
        Self {
            connections,
            sessions,
            rooms,
        }
    }

    /// Connection registry.
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Session registry.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Room broadcaster.
    pub fn rooms(&self) -> &Arc<RoomBroadcaster> {
        &self.rooms
    }

    /// Register a new link, attach its outbox, and send `welcome`.
    pub fn connect(
        &self,
        transport_id: TransportId,
        metadata: ConnectionMetadata,
        outbox: Arc<Outbox>,
    ) -> Result<ConnectionId> {
        let user_agent = metadata.user_agent.clone();
        let id = self.connections.register(transport_id, metadata)?;
        self.rooms.attach(id.clone(), outbox);
        info!(connection_id = %id, user_agent = ?user_agent, "new connection established");
        self.reply(&id, OutboundEvent::welcome(id.clone()));
        Ok(id)
    }

    /// Parse and dispatch one text frame.
    pub fn handle_frame(&self, id: &ConnectionId, text: &str) -> Flow {
        match InboundEvent::parse(text) {
            Ok(event) => self.dispatch(id, event),
            Err(err) => {
                self.reject(id, &err);
                Flow::Continue
            }
        }
    }

    /// Run the handler for one parsed event.
    pub fn dispatch(&self, id: &ConnectionId, event: InboundEvent) -> Flow {
        let name = event.name();
        counter!(EVENTS_RECEIVED_TOTAL, "event" => name).increment(1);
        debug!(connection_id = %id, event = name, "event received");

        match event {
            InboundEvent::Authenticate(p) => self.on_authenticate(id, p),
            InboundEvent::JoinSession(p) => self.on_join_session(id, p),
            InboundEvent::ChatMessage(p) => self.on_chat_message(id, p),
            InboundEvent::TaskUpdate(p) => self.on_task_update(p),
            InboundEvent::FileOperation(p) => self.on_file_operation(id, p),
            InboundEvent::AgentStatus(p) => self.on_agent_status(p),
            InboundEvent::TypingStart(p) => self.on_typing(id, p, true),
            InboundEvent::TypingStop(p) => self.on_typing(id, p, false),
            InboundEvent::Ping(_) => self.reply(id, OutboundEvent::pong()),
            InboundEvent::Disconnect(p) => {
                let reason = p.reason.as_deref().unwrap_or("client disconnect");
                let _ = self.disconnect(id, reason);
                return Flow::Close;
            }
        }
        Flow::Continue
    }

    /// Tear down a connection: unregister it, drop it from every room, and
    /// remove every session still bound to it.
    ///
    /// Safe to call more than once. Later calls return `None`.
    pub fn disconnect(&self, id: &ConnectionId, reason: &str) -> Option<Connection> {
        let _ = self.rooms.detach(id);
        let connection = match self.connections.unregister(id) {
            Ok(c) => c,
            Err(e) => {
                debug!(connection_id = %id, error = %e, "disconnect for unknown connection");
                return None;
            }
        };

        for session_id in self.sessions.remove_bound_to(id) {
            debug!(connection_id = %id, session_id = %session_id, "owned session removed");
        }

        info!(
            connection_id = %id,
            reason,
            duration_ms = connection.duration().num_milliseconds(),
            "client disconnected"
        );
        Some(connection)
    }

    // ── Interactive events ──

    fn on_authenticate(&self, id: &ConnectionId, payload: AuthenticatePayload) {
        let result = if payload.user_id.is_empty() {
            Err(RelayError::Validation("userId must not be empty".into()))
        } else {
            self.connections.authenticate(id, payload.user_id)
        };
        match result {
            Ok(connection) => {
                if let Some(user_id) = connection.user_id {
                    self.reply(id, OutboundEvent::authenticated(user_id));
                }
            }
            Err(e) => {
                event_failed("authenticate", id, &e);
                self.reply(id, OutboundEvent::authentication_error());
            }
        }
    }

    fn on_join_session(&self, id: &ConnectionId, payload: JoinSessionPayload) {
        match self.join_session(id, payload) {
            Ok(session_id) => self.reply(id, OutboundEvent::session_joined(session_id)),
            Err(e) => {
                event_failed("join_session", id, &e);
                self.reply(id, OutboundEvent::session_error());
            }
        }
    }

    fn join_session(&self, id: &ConnectionId, payload: JoinSessionPayload) -> Result<SessionId> {
        if payload.session_id.is_empty() {
            return Err(RelayError::Validation("sessionId must not be empty".into()));
        }
        let connection = self.connections.lookup(id)?;
        let user_id = match (payload.user_id, connection.user_id) {
            (Some(claimed), Some(actual)) if claimed != actual => {
                return Err(RelayError::Validation(format!(
                    "userId {claimed} does not match authenticated user {actual}"
                )));
            }
            (Some(user), _) | (None, Some(user)) if !user.is_empty() => user,
            _ => return Err(RelayError::Validation("join_session requires a userId".into())),
        };

        let session_id = payload.session_id;
        if let Some(previous) = connection.session_id.filter(|p| *p != session_id) {
            self.rooms.leave(id, &RoomKey::session(&previous));
        }
        let session = self
            .sessions
            .create_or_join(session_id.clone(), user_id.clone(), id.clone());
        let room = RoomKey::session(&session_id);
        let _ = self.rooms.join(id, room.clone());
        if let Err(e) = self.connections.bind_session(id, session_id.clone()) {
            // Gone since the lookup above.
            self.rooms.leave(id, &room);
            let _ = self.sessions.remove_if_bound(&session_id, id);
            return Err(e);
        }

        info!(
            connection_id = %id,
            session_id = %session_id,
            user_id = %user_id,
            owner = %session.user_id,
            "user joined session"
        );
        Ok(session_id)
    }

    fn on_chat_message(&self, id: &ConnectionId, payload: ChatMessagePayload) {
        match self.chat_message(id, payload) {
            Ok(()) => {}
            Err(e) => {
                event_failed("chat_message", id, &e);
                self.reply(id, OutboundEvent::chat_error());
            }
        }
    }

    fn chat_message(&self, id: &ConnectionId, payload: ChatMessagePayload) -> Result<()> {
        let user_id = self.sender_identity(id, payload.user_id)?;
        let session_id = payload.session_id;
        let _ = self.sessions.touch(&session_id);

        let len = payload.message.len();
        let event =
            OutboundEvent::chat_message(session_id.clone(), user_id.clone(), payload.message);
        let delivered = self.rooms.publish(&RoomKey::session(&session_id), &event, None);
        info!(
            session_id = %session_id,
            user_id = %user_id,
            message_len = len,
            delivered,
            "chat message sent"
        );
        Ok(())
    }

    // ── Fire-and-forget events ──

    fn on_task_update(&self, payload: TaskUpdatePayload) {
        let rooms = self.target_rooms(payload.user_id.as_ref(), payload.session_id.as_ref());
        if rooms.is_empty() {
            event_dropped("task_update", "no userId or sessionId");
            return;
        }
        let event = OutboundEvent::task_update(payload.task_id.clone(), payload.status);
        let delivered = self.rooms.publish_many(&rooms, &event, None);
        info!(
            task_id = %payload.task_id,
            status = %payload.status,
            delivered,
            "task update broadcasted"
        );
    }

    fn on_agent_status(&self, payload: AgentStatusPayload) {
        let rooms = self.target_rooms(payload.user_id.as_ref(), payload.session_id.as_ref());
        if rooms.is_empty() {
            event_dropped("agent_status", "no userId or sessionId");
            return;
        }
        let event = OutboundEvent::agent_status(payload.agent_id.clone(), payload.status.clone());
        let delivered = self.rooms.publish_many(&rooms, &event, None);
        info!(
            agent_id = %payload.agent_id,
            status = %payload.status,
            delivered,
            "agent status broadcasted"
        );
    }

    fn on_file_operation(&self, id: &ConnectionId, payload: FileOperationPayload) {
        let user_id = match self.addressed_user(id, payload.user_id) {
            Ok(user) => user,
            Err(e) => {
                event_dropped("file_operation", &e.to_string());
                return;
            }
        };
        let event = OutboundEvent::file_operation(
            payload.operation.clone(),
            payload.path.clone(),
            payload.status.clone(),
        );
        let delivered = self.rooms.publish(&RoomKey::user(&user_id), &event, None);
        info!(
            operation = %payload.operation,
            path = %payload.path,
            status = %payload.status,
            user_id = %user_id,
            delivered,
            "file operation broadcasted"
        );
    }

    fn on_typing(&self, id: &ConnectionId, payload: TypingPayload, typing: bool) {
        let event_name = if typing { "typing_start" } else { "typing_stop" };
        let user_id = match self.sender_identity(id, payload.user_id) {
            Ok(user) => user,
            Err(e) => {
                event_dropped(event_name, &e.to_string());
                return;
            }
        };
        let _ = self.sessions.touch(&payload.session_id);
        let event = OutboundEvent::user_typing(user_id, typing);
        let _ = self
            .rooms
            .publish(&RoomKey::session(&payload.session_id), &event, Some(id));
    }

    // ── Helpers ──

    /// Authenticated identity of `id`, else the one claimed in the payload.
    fn sender_identity(&self, id: &ConnectionId, claimed: Option<UserId>) -> Result<UserId> {
        let connection = self.connections.lookup(id)?;
        connection
            .user_id
            .or(claimed)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                RelayError::Validation("no userId for unauthenticated connection".into())
            })
    }

    /// User named in the payload, else the sender's authenticated identity.
    fn addressed_user(&self, id: &ConnectionId, named: Option<UserId>) -> Result<UserId> {
        match named.filter(|u| !u.is_empty()) {
            Some(user) => Ok(user),
            None => self.sender_identity(id, None),
        }
    }

    fn target_rooms(&self, user: Option<&UserId>, session: Option<&SessionId>) -> Vec<RoomKey> {
        if let Some(session) = session {
            let _ = self.sessions.touch(session);
        }
        user.map(RoomKey::user)
            .into_iter()
            .chain(session.map(RoomKey::session))
            .collect()
    }

    fn reply(&self, id: &ConnectionId, event: OutboundEvent) {
        if !self.rooms.send_to(id, &event) {
            debug!(connection_id = %id, event = event.name(), "reply not delivered");
        }
    }

    fn reject(&self, id: &ConnectionId, err: &FrameError) {
        let event = err.event().unwrap_or("unknown");
        counter!(EVENT_ERRORS_TOTAL, "event" => event.to_owned()).increment(1);
        warn!(connection_id = %id, error = %err, "rejected frame");

        let reply = match err.event() {
            Some("authenticate") => OutboundEvent::authentication_error(),
            Some("join_session") => OutboundEvent::session_error(),
            Some("chat_message") => OutboundEvent::chat_error(),
            Some(_) => return,
            None => OutboundEvent::error(relay_core::errors::VALIDATION_ERROR, err.to_string()),
        };
        self.reply(id, reply);
    }
}

fn event_failed(event: &'static str, id: &ConnectionId, err: &RelayError) {
    counter!(EVENT_ERRORS_TOTAL, "event" => event).increment(1);
    warn!(connection_id = %id, event, code = err.code(), error = %err, "event failed");
}

fn event_dropped(event: &'static str, why: &str) {
    counter!(EVENT_ERRORS_TOTAL, "event" => event).increment(1);
    warn!(event, reason = why, "event not broadcast");
}
