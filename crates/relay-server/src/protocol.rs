//! Wire protocol.
//!
//! Every frame in either direction is a JSON object
//! `{"event": "<name>", "data": {...}}`. Inbound frames parse into
//! [`InboundEvent`]; everything the server emits is an [`OutboundEvent`].

use std::sync::Arc;

use relay_core::time::timestamp;
use relay_core::{AgentId, ConnectionId, MessageId, SessionId, TaskId, TaskStatus, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Greeting sent to every new connection.
pub const WELCOME_MESSAGE: &str = "Connected to AI Agent WebSocket service";

/// Event names accepted from clients.
pub const INBOUND_EVENTS: [&str; 10] = [
    "authenticate",
    "join_session",
    "chat_message",
    "task_update",
    "file_operation",
    "agent_status",
    "typing_start",
    "typing_stop",
    "ping",
    "disconnect",
];

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// `authenticate` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatePayload {
    /// Identity to attach.
    pub user_id: UserId,
    /// Opaque credential. Accepted as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// `join_session` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionPayload {
    /// Session to create or rejoin.
    pub session_id: SessionId,
    /// Defaults to the connection's authenticated user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

/// `chat_message` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    /// Target session room.
    pub session_id: SessionId,
    /// Message body.
    pub message: String,
    /// Used only when the connection is not authenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

/// `task_update` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdatePayload {
    /// Task the update refers to.
    pub task_id: TaskId,
    /// New status.
    pub status: TaskStatus,
    /// Owner room to notify.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Session room to notify.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// `file_operation` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOperationPayload {
    /// What was done (`read`, `write`, ...).
    pub operation: String,
    /// Path it was done to.
    pub path: String,
    /// Outcome reported by the client.
    pub status: String,
    /// Defaults to the connection's authenticated user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

/// `agent_status` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusPayload {
    /// Agent the status refers to.
    pub agent_id: AgentId,
    /// Free-form status string.
    pub status: String,
    /// Owner room to notify.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Session room to notify.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// `typing_start` / `typing_stop` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    /// Session room to notify.
    pub session_id: SessionId,
    /// Defaults to the connection's authenticated user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

/// `ping` payload (empty).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingPayload {}

/// `disconnect` payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectPayload {
    /// Why the client is leaving.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A validated client event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Attach an identity.
    Authenticate(AuthenticatePayload),
    /// Create or rejoin a session.
    JoinSession(JoinSessionPayload),
    /// Relay a chat line to the session room.
    ChatMessage(ChatMessagePayload),
    /// Relay a task status change.
    TaskUpdate(TaskUpdatePayload),
    /// Relay a file operation notice.
    FileOperation(FileOperationPayload),
    /// Relay an agent status change.
    AgentStatus(AgentStatusPayload),
    /// Sender started typing.
    TypingStart(TypingPayload),
    /// Sender stopped typing.
    TypingStop(TypingPayload),
    /// Liveness probe.
    Ping(PingPayload),
    /// Client is leaving.
    Disconnect(DisconnectPayload),
}

/// Why an inbound frame was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Not a JSON object with a string `event`.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// `event` names nothing the server handles.
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    /// Known event, invalid `data`.
    #[error("invalid {event} payload: {message}")]
    Payload {
        /// Event name.
        event: String,
        /// Deserializer message.
        message: String,
    },
}

impl FrameError {
    /// The event name, when the frame got far enough to have one.
    pub fn event(&self) -> Option<&str> {
        match self {
            Self::Payload { event, .. } => Some(event),
            Self::Malformed(_) | Self::UnknownEvent(_) => None,
        }
    }
}

impl InboundEvent {
    /// Parse one text frame.
    ///
    /// A missing or `null` `data` is read as `{}`, so payload-less events like
    /// `ping` may omit it.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let mut frame: Value =
            serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;
        let Some(object) = frame.as_object_mut() else {
            return Err(FrameError::Malformed("expected a JSON object".into()));
        };
        let name = object
            .get("event")
            .and_then(Value::as_str)
            .ok_or_else(|| FrameError::Malformed("missing string field `event`".into()))?
            .to_owned();
        if !INBOUND_EVENTS.contains(&name.as_str()) {
            return Err(FrameError::UnknownEvent(name));
        }
        if object.get("data").is_none_or(Value::is_null) {
            let _ = object.insert("data".into(), Value::Object(Map::new()));
        }
        serde_json::from_value(frame).map_err(|e| FrameError::Payload {
            event: name,
            message: e.to_string(),
        })
    }

    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate(_) => "authenticate",
            Self::JoinSession(_) => "join_session",
            Self::ChatMessage(_) => "chat_message",
            Self::TaskUpdate(_) => "task_update",
            Self::FileOperation(_) => "file_operation",
            Self::AgentStatus(_) => "agent_status",
            Self::TypingStart(_) => "typing_start",
            Self::TypingStop(_) => "typing_stop",
            Self::Ping(_) => "ping",
            Self::Disconnect(_) => "disconnect",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the server sends to clients.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
#[allow(missing_docs)]
pub enum OutboundEvent {
    Welcome {
        message: String,
        connection_id: ConnectionId,
        timestamp: String,
    },
    Authenticated {
        success: bool,
        user_id: UserId,
        timestamp: String,
    },
    AuthenticationError {
        success: bool,
        error: String,
        timestamp: String,
    },
    SessionJoined {
        session_id: SessionId,
        timestamp: String,
    },
    SessionError {
        error: String,
        timestamp: String,
    },
    ChatMessage {
        id: MessageId,
        session_id: SessionId,
        user_id: UserId,
        message: String,
        #[serde(rename = "type")]
        kind: String,
        timestamp: String,
    },
    ChatError {
        error: String,
        timestamp: String,
    },
    TaskUpdate {
        task_id: TaskId,
        status: TaskStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: String,
    },
    FileOperation {
        operation: String,
        path: String,
        status: String,
        timestamp: String,
    },
    AgentStatus {
        agent_id: AgentId,
        status: String,
        timestamp: String,
    },
    UserTyping {
        user_id: UserId,
        typing: bool,
        timestamp: String,
    },
    Pong {
        timestamp: String,
    },
    Error {
        code: String,
        message: String,
        timestamp: String,
    },
}

impl OutboundEvent {
    /// `welcome` for a fresh connection.
    pub fn welcome(connection_id: ConnectionId) -> Self {
        Self::Welcome {
            message: WELCOME_MESSAGE.into(),
            connection_id,
            timestamp: timestamp(),
        }
    }

    /// `authenticated` acknowledgement.
    pub fn authenticated(user_id: UserId) -> Self {
        Self::Authenticated {
            success: true,
            user_id,
            timestamp: timestamp(),
        }
    }

    /// `authentication_error` reply.
    pub fn authentication_error() -> Self {
        Self::AuthenticationError {
            success: false,
            error: "Authentication failed".into(),
            timestamp: timestamp(),
        }
    }

    /// `session_joined` acknowledgement.
    pub fn session_joined(session_id: SessionId) -> Self {
        Self::SessionJoined {
            session_id,
            timestamp: timestamp(),
        }
    }

    /// `session_error` reply.
    pub fn session_error() -> Self {
        Self::SessionError {
            error: "Failed to join session".into(),
            timestamp: timestamp(),
        }
    }

    /// A user chat line with a fresh message id.
    pub fn chat_message(session_id: SessionId, user_id: UserId, message: String) -> Self {
        Self::ChatMessage {
            id: MessageId::new(),
            session_id,
            user_id,
            message,
            kind: "user".into(),
            timestamp: timestamp(),
        }
    }

    /// `chat_error` reply.
    pub fn chat_error() -> Self {
        Self::ChatError {
            error: "Failed to send message".into(),
            timestamp: timestamp(),
        }
    }

    /// Bare `task_update`.
    pub fn task_update(task_id: TaskId, status: TaskStatus) -> Self {
        Self::TaskUpdate {
            task_id,
            status,
            output: None,
            error: None,
            timestamp: timestamp(),
        }
    }

    /// `task_update` carrying a task's result or failure.
    pub fn task_snapshot(task: &relay_core::Task) -> Self {
        Self::TaskUpdate {
            task_id: task.id.clone(),
            status: task.status,
            output: task.output.clone(),
            error: task.error.clone(),
            timestamp: timestamp(),
        }
    }

    /// `file_operation` notice.
    pub fn file_operation(operation: String, path: String, status: String) -> Self {
        Self::FileOperation {
            operation,
            path,
            status,
            timestamp: timestamp(),
        }
    }

    /// `agent_status` notice.
    pub fn agent_status(agent_id: AgentId, status: String) -> Self {
        Self::AgentStatus {
            agent_id,
            status,
            timestamp: timestamp(),
        }
    }

    /// `user_typing` indicator.
    pub fn user_typing(user_id: UserId, typing: bool) -> Self {
        Self::UserTyping {
            user_id,
            typing,
            timestamp: timestamp(),
        }
    }

    /// `pong` reply.
    pub fn pong() -> Self {
        Self::Pong {
            timestamp: timestamp(),
        }
    }

    /// Generic `error` reply.
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
            timestamp: timestamp(),
        }
    }

    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::Authenticated { .. } => "authenticated",
            Self::AuthenticationError { .. } => "authentication_error",
            Self::SessionJoined { .. } => "session_joined",
            Self::SessionError { .. } => "session_error",
            Self::ChatMessage { .. } => "chat_message",
            Self::ChatError { .. } => "chat_error",
            Self::TaskUpdate { .. } => "task_update",
            Self::FileOperation { .. } => "file_operation",
            Self::AgentStatus { .. } => "agent_status",
            Self::UserTyping { .. } => "user_typing",
            Self::Pong { .. } => "pong",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize once for fan-out.
    pub fn encode(&self) -> Result<Arc<String>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn wire(event: &OutboundEvent) -> Value {
        serde_json::from_str(&event.encode().unwrap()).unwrap()
    }

    #[test]
    fn parses_authenticate() {
        let ev = InboundEvent::parse(
            r#"{"event":"authenticate","data":{"userId":"u1","token":"t"}}"#,
        )
        .unwrap();
        assert_eq!(
            ev,
            InboundEvent::Authenticate(AuthenticatePayload {
                user_id: UserId::from("u1"),
                token: Some("t".into()),
            })
        );
        assert_eq!(ev.name(), "authenticate");
    }

    #[test]
    fn ping_without_data() {
        assert_matches!(
            InboundEvent::parse(r#"{"event":"ping"}"#),
            Ok(InboundEvent::Ping(_))
        );
        assert_matches!(
            InboundEvent::parse(r#"{"event":"ping","data":null}"#),
            Ok(InboundEvent::Ping(_))
        );
    }

    #[test]
    fn disconnect_reason_is_optional() {
        assert_matches!(
            InboundEvent::parse(r#"{"event":"disconnect"}"#),
            Ok(InboundEvent::Disconnect(DisconnectPayload { reason: None }))
        );
        assert_matches!(
            InboundEvent::parse(r#"{"event":"disconnect","data":{"reason":"bye"}}"#),
            Ok(InboundEvent::Disconnect(DisconnectPayload { reason: Some(r) })) if r == "bye"
        );
    }

    #[test]
    fn task_update_status_is_typed() {
        let ok = InboundEvent::parse(
            r#"{"event":"task_update","data":{"taskId":"t1","status":"running","userId":"u1"}}"#,
        )
        .unwrap();
        assert_matches!(
            ok,
            InboundEvent::TaskUpdate(p)
                if p.status == TaskStatus::Running && p.session_id.is_none()
        );

        let err = InboundEvent::parse(
            r#"{"event":"task_update","data":{"taskId":"t1","status":"exploded"}}"#,
        )
        .unwrap_err();
        assert_eq!(err.event(), Some("task_update"));
    }

    #[test]
    fn not_json_is_malformed() {
        assert_matches!(InboundEvent::parse("hello"), Err(FrameError::Malformed(_)));
        assert_matches!(InboundEvent::parse("[1,2]"), Err(FrameError::Malformed(_)));
        assert_matches!(
            InboundEvent::parse(r#"{"data":{}}"#),
            Err(FrameError::Malformed(_))
        );
    }

    #[test]
    fn unknown_event_is_named() {
        assert_eq!(
            InboundEvent::parse(r#"{"event":"teleport","data":{}}"#).unwrap_err(),
            FrameError::UnknownEvent("teleport".into())
        );
    }

    #[test]
    fn missing_field_is_payload_error() {
        let err = InboundEvent::parse(r#"{"event":"join_session","data":{}}"#).unwrap_err();
        assert_matches!(&err, FrameError::Payload { event, message }
            if event == "join_session" && message.contains("sessionId"));
    }

    #[test]
    fn inbound_serializes_to_envelope() {
        let ev = InboundEvent::TypingStart(TypingPayload {
            session_id: SessionId::from("s1"),
            user_id: None,
        });
        assert_eq!(
            serde_json::to_value(&ev).unwrap(),
            json!({"event": "typing_start", "data": {"sessionId": "s1"}})
        );
    }

    #[test]
    fn welcome_shape() {
        let v = wire(&OutboundEvent::welcome(ConnectionId::from("c1")));
        assert_eq!(v["event"], "welcome");
        assert_eq!(v["data"]["message"], WELCOME_MESSAGE);
        assert_eq!(v["data"]["connectionId"], "c1");
        assert!(v["data"]["timestamp"].is_string());
    }

    #[test]
    fn chat_message_shape() {
        let v = wire(&OutboundEvent::chat_message(
            SessionId::from("s1"),
            UserId::from("u1"),
            "hi".into(),
        ));
        assert_eq!(v["event"], "chat_message");
        let data = &v["data"];
        assert_eq!(data["sessionId"], "s1");
        assert_eq!(data["userId"], "u1");
        assert_eq!(data["message"], "hi");
        assert_eq!(data["type"], "user");
        assert!(data["id"].as_str().is_some_and(|s| !s.is_empty()));
    }

    #[test]
    fn error_replies_match_fixed_text() {
        let v = wire(&OutboundEvent::authentication_error());
        assert_eq!(v["data"]["success"], false);
        assert_eq!(v["data"]["error"], "Authentication failed");
        assert_eq!(
            wire(&OutboundEvent::session_error())["data"]["error"],
            "Failed to join session"
        );
        assert_eq!(
            wire(&OutboundEvent::chat_error())["data"]["error"],
            "Failed to send message"
        );
    }

    #[test]
    fn bare_task_update_omits_result_fields() {
        let v = wire(&OutboundEvent::task_update(
            TaskId::from("t1"),
            TaskStatus::Completed,
        ));
        assert_eq!(v["data"]["taskId"], "t1");
        assert_eq!(v["data"]["status"], "completed");
        assert!(v["data"].get("output").is_none());
        assert!(v["data"].get("error").is_none());
    }

    #[test]
    fn typing_shape() {
        let v = wire(&OutboundEvent::user_typing(UserId::from("u1"), true));
        assert_eq!(v["event"], "user_typing");
        assert_eq!(v["data"]["userId"], "u1");
        assert_eq!(v["data"]["typing"], true);
    }

    #[test]
    fn outbound_names_match_wire_tags() {
        let events = [
            OutboundEvent::pong(),
            OutboundEvent::session_error(),
            OutboundEvent::agent_status(AgentId::from("a"), "idle".into()),
            OutboundEvent::file_operation("write".into(), "a.txt".into(), "done".into()),
            OutboundEvent::error("VALIDATION_ERROR", "bad"),
        ];
        for ev in events {
            assert_eq!(wire(&ev)["event"], ev.name());
        }
    }
}
