//! Connection, session, and task records.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

use crate::ids::{AgentId, ConnectionId, SessionId, TaskId, TransportId, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// Connection
// ─────────────────────────────────────────────────────────────────────────────

/// Transport details captured at connect time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMetadata {
    /// `User-Agent` header of the upgrade request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Peer socket address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
}

/// One live transport-level link.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Process-unique id.
    pub id: ConnectionId,
    /// Transport-layer id of the socket.
    pub transport_id: TransportId,
    /// When the link was registered.
    pub connected_at: DateTime<Utc>,
    /// Set by `authenticate`.
    pub user_id: Option<UserId>,
    /// Set by `join_session`, cleared when the session expires.
    pub session_id: Option<SessionId>,
    /// Set by `authenticate`.
    pub authenticated_at: Option<DateTime<Utc>>,
    /// Transport details.
    pub metadata: ConnectionMetadata,
}

impl Connection {
    /// A fresh, unauthenticated, unbound connection.
    pub fn new(transport_id: TransportId, metadata: ConnectionMetadata) -> Self {
        Self {
            id: ConnectionId::new(),
            transport_id,
            connected_at: Utc::now(),
            user_id: None,
            session_id: None,
            authenticated_at: None,
            metadata,
        }
    }

    /// Whether an identity has been attached.
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// How long the link has been open.
    pub fn duration(&self) -> chrono::Duration {
        Utc::now() - self.connected_at
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// A logical conversation context that can outlive any single connection.
#[derive(Clone, Debug)]
pub struct Session {
    /// Session id (client supplied).
    pub id: SessionId,
    /// The user that created the session.
    pub user_id: UserId,
    /// The connection currently bound to the session.
    pub connection_id: ConnectionId,
    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
    /// Monotonic time of the last session-scoped event.
    pub last_activity: Instant,
}

impl Session {
    /// New session bound to `connection_id`, active as of `now`.
    pub fn new(id: SessionId, user_id: UserId, connection_id: ConnectionId, now: Instant) -> Self {
        Self {
            id,
            user_id,
            connection_id,
            created_at: Utc::now(),
            last_activity: now,
        }
    }

    /// Refresh `last_activity`. Never moves it backwards.
    pub fn touch(&mut self, now: Instant) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Time since the last activity, as seen at `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Task enums
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a task: `pending → running → {completed, failed}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, not yet picked up.
    #[default]
    Pending,
    /// Handler in flight.
    Running,
    /// Handler returned output.
    Completed,
    /// Handler failed, timed out, or no handler exists.
    Failed,
}

impl TaskStatus {
    /// `completed` or `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self → next` is a legal forward transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running) | (Self::Running, Self::Completed | Self::Failed)
        )
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work a task performs; selects its handler.
///
/// Unrecognised names are kept as [`TaskType::Other`] so that they reach the
/// executor and fail there with a descriptive error.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskType {
    /// Read/write/list files under the workspace root.
    FileManagement,
    /// Fetch a page and extract content.
    WebScraping,
    /// Ask the completion service to analyse data.
    DataAnalysis,
    /// Repository operations.
    GithubIntegration,
    /// Free-form completion.
    Custom,
    /// Anything else.
    Other(String),
}

impl TaskType {
    /// The five types with built-in handlers.
    pub const KNOWN: [TaskType; 5] = [
        TaskType::FileManagement,
        TaskType::WebScraping,
        TaskType::DataAnalysis,
        TaskType::GithubIntegration,
        TaskType::Custom,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::FileManagement => "file_management",
            Self::WebScraping => "web_scraping",
            Self::DataAnalysis => "data_analysis",
            Self::GithubIntegration => "github_integration",
            Self::Custom => "custom",
            Self::Other(name) => name,
        }
    }

    /// Whether this is one of [`TaskType::KNOWN`].
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for TaskType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "file_management" => Self::FileManagement,
            "web_scraping" => Self::WebScraping,
            "data_analysis" => Self::DataAnalysis,
            "github_integration" => Self::GithubIntegration,
            "custom" => Self::Custom,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for TaskType {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<TaskType> for String {
    fn from(t: TaskType) -> Self {
        match t {
            TaskType::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling hint carried with a task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Low.
    Low,
    /// Medium (default).
    #[default]
    Medium,
    /// High.
    High,
}

// ─────────────────────────────────────────────────────────────────────────────
// Task
// ─────────────────────────────────────────────────────────────────────────────

/// A unit of asynchronous work.
///
/// The request layer creates tasks in `pending`. Only the executor writes
/// `status`, `output`, `error`, `started_at`, and `completed_at`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Task id.
    pub id: TaskId,
    /// Short human title.
    #[serde(default)]
    pub title: String,
    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Selects the handler.
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Lifecycle state.
    #[serde(default)]
    pub status: TaskStatus,
    /// Scheduling hint.
    #[serde(default)]
    pub priority: TaskPriority,
    /// Opaque handler input.
    #[serde(default)]
    pub input: Value,
    /// Handler output, set on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Human-readable failure, set on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Agent the task is attributed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Session whose room observes the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Owner; `user:<id>` room observes the task.
    pub user_id: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// When the executor moved the task to `running`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A new `pending` task with default priority and no title.
    pub fn pending(id: TaskId, task_type: TaskType, user_id: UserId, input: Value) -> Self {
        Self {
            id,
            title: String::new(),
            description: None,
            task_type,
            status: TaskStatus::Pending,
            priority: TaskPriority::default(),
            input,
            output: None,
            error: None,
            agent_id: None,
            session_id: None,
            user_id,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Builder: set the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Builder: attach a session.
    #[must_use]
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Builder: attach an agent.
    #[must_use]
    pub fn with_agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// `pending → running`. Returns `false` (and changes nothing) otherwise.
    pub fn start(&mut self) -> bool {
        if !self.status.can_transition_to(TaskStatus::Running) {
            return false;
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// `running → completed` with `output`.
    pub fn complete(&mut self, output: Value) -> bool {
        if !self.status.can_transition_to(TaskStatus::Completed) {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.output = Some(output);
        self.completed_at = Some(Utc::now());
        true
    }

    /// `pending|running → failed` with `error`.
    ///
    /// A pending task may fail directly when it can never run (no handler).
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        true
    }
}
