use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Execution status of a task. Terminal states are `Completed`, `Failed`
/// and `Cancelled`; no transition leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A natural-language task submitted against a robot or team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub workspace_id: u64,
    pub user_id: u64,
    pub status: TaskStatus,

    pub title: String,
    #[serde(default)]
    pub description: String,
    pub prompt: String,

    /// Execution target: "robot" (or legacy "bot") or "team".
    pub resource_type: String,
    pub resource_name: String,
    /// Collaboration mode override for teams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,

    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub progress: i32,
    /// Raw NDJSON event records, one per line.
    #[serde(default)]
    pub event_logs: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds, set on completion.
    #[serde(default)]
    pub duration_ms: i64,
}

impl Task {
    /// A fresh pending task; the id is assigned by the task store on create.
    pub fn new(
        workspace_id: u64,
        user_id: u64,
        title: impl Into<String>,
        prompt: impl Into<String>,
        resource_type: impl Into<String>,
        resource_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            workspace_id,
            user_id,
            status: TaskStatus::Pending,
            title: title.into(),
            description: String::new(),
            prompt: prompt.into(),
            resource_type: resource_type.into(),
            resource_name: resource_name.into(),
            mode: None,
            git_url: None,
            branch_name: None,
            result: String::new(),
            error: String::new(),
            progress: 0,
            event_logs: String::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            duration_ms: 0,
        }
    }
}

/// An append-only log row produced for every non-suppressed runtime event
/// plus scheduler events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLog {
    #[serde(default)]
    pub id: u64,
    pub task_id: u64,
    pub level: String,
    /// JSON object `{type, content, details?}` for client-side parsing.
    pub message: String,
    pub event_type: String,
    pub created_at: DateTime<Utc>,
}

impl TaskLog {
    pub fn new(
        task_id: u64,
        level: impl Into<String>,
        message: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            task_id,
            level: level.into(),
            message: message.into(),
            event_type: event_type.into(),
            created_at: Utc::now(),
        }
    }
}

/// A user's workspace; resources and tasks are scoped to one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: u64,
    pub user_id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A stored declarative resource row. `spec` holds the original textual
/// declaration verbatim; parsing happens at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: u64,
    pub workspace_id: u64,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub spec: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Called by the executor and queue to report task progress. Arguments:
/// task id, progress (0-100), status, message, optional metadata
/// (`{"type": ..., "details": ...}`). The returned future is awaited by
/// the caller, so persistence and broadcast keep event order per task.
pub type ProgressCallback = Arc<
    dyn Fn(u64, i32, TaskStatus, String, Option<serde_json::Value>) -> BoxFuture<'static, ()>
        + Send
        + Sync,
>;
