use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A real-time event broadcast to the subscribers of one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: u64,
    /// Frame class for clients; broadcast events are always "log".
    #[serde(rename = "type")]
    pub kind: String,
    /// Runtime event type ("started", "content", "tool_call_started", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Stamped by the broadcaster at publish time.
    pub timestamp: DateTime<Utc>,
}

impl TaskEvent {
    /// A "log" frame, the shape produced by the task lifecycle callback.
    pub fn log(
        task_id: u64,
        event_type: impl Into<String>,
        content: impl Into<String>,
        details: Option<serde_json::Value>,
        progress: i32,
        status: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            kind: "log".to_string(),
            event_type: Some(event_type.into()),
            content: content.into(),
            details,
            progress: Some(progress),
            status: Some(status.into()),
            timestamp: Utc::now(),
        }
    }
}
