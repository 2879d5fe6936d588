//! The task lifecycle callback: for every progress event, broadcast a
//! frame to subscribers, fold progress/status into the task row, and
//! append a structured log entry.

use maestro_broadcast::{EventBroadcaster, TaskEvent};
use maestro_core::{ProgressCallback, TaskLog};
use maestro_storage::Storage;
use std::sync::Arc;
use tracing::warn;

/// Build the callback wired into every submitted task. The event type is
/// taken from `metadata.type` (default "info") and `metadata.details`
/// rides along into both the broadcast frame and the log row.
pub fn task_progress_callback(
    storage: Storage,
    broadcaster: Arc<EventBroadcaster>,
) -> ProgressCallback {
    Arc::new(move |task_id, progress, status, message, metadata| {
        let event_type = metadata
            .as_ref()
            .and_then(|m| m.get("type"))
            .and_then(|v| v.as_str())
            .unwrap_or("info")
            .to_string();
        let details = metadata.as_ref().and_then(|m| m.get("details")).cloned();

        broadcaster.broadcast(TaskEvent::log(
            task_id,
            &event_type,
            &message,
            details.clone(),
            progress,
            status.to_string(),
        ));

        let storage = storage.clone();
        Box::pin(async move {
            if let Ok(mut task) = storage.tasks().get_by_id(task_id).await {
                // Terminal states are final; a straggling progress update
                // must not resurrect a finished task.
                if !task.status.is_terminal() {
                    task.progress = progress;
                    task.status = status;
                    if let Err(e) = storage.tasks().update(&task).await {
                        warn!(task_id, error = %e, "failed to persist task progress");
                    }
                }
            }

            let mut log_message = serde_json::json!({
                "type": event_type,
                "content": message,
            });
            if let Some(details) = details {
                log_message["details"] = details;
            }
            let log = TaskLog::new(task_id, "info", log_message.to_string(), &event_type);
            if let Err(e) = storage.tasks().add_log(log).await {
                warn!(task_id, error = %e, "failed to append task log");
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::{Task, TaskStatus};

    #[tokio::test]
    async fn callback_broadcasts_updates_and_logs() {
        let storage = Storage::in_memory();
        let broadcaster = EventBroadcaster::new();
        let task = storage
            .tasks()
            .create(Task::new(1, 1, "t", "p", "robot", "r"))
            .await
            .unwrap();
        let mut sub = broadcaster.subscribe(task.id);

        let callback = task_progress_callback(storage.clone(), broadcaster.clone());
        callback(
            task.id,
            40,
            TaskStatus::Running,
            "thinking".to_string(),
            Some(serde_json::json!({
                "type": "thinking_step",
                "details": {"step": 1},
            })),
        )
        .await;

        let event = sub.recv().await.unwrap();
        assert_eq!(event.event_type.as_deref(), Some("thinking_step"));
        assert_eq!(event.content, "thinking");
        assert_eq!(event.progress, Some(40));
        assert_eq!(event.status.as_deref(), Some("running"));
        assert_eq!(event.details.unwrap()["step"], 1);

        let updated = storage.tasks().get_by_id(task.id).await.unwrap();
        assert_eq!(updated.progress, 40);
        assert_eq!(updated.status, TaskStatus::Running);

        let logs = storage.tasks().get_logs(task.id, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].event_type, "thinking_step");
        let message: serde_json::Value = serde_json::from_str(&logs[0].message).unwrap();
        assert_eq!(message["type"], "thinking_step");
        assert_eq!(message["content"], "thinking");
        assert_eq!(message["details"]["step"], 1);
    }

    #[tokio::test]
    async fn event_type_defaults_to_info() {
        let storage = Storage::in_memory();
        let broadcaster = EventBroadcaster::new();
        let task = storage
            .tasks()
            .create(Task::new(1, 1, "t", "p", "robot", "r"))
            .await
            .unwrap();
        let mut sub = broadcaster.subscribe(task.id);

        let callback = task_progress_callback(storage.clone(), broadcaster.clone());
        callback(
            task.id,
            10,
            TaskStatus::Running,
            "task started".to_string(),
            None,
        )
        .await;

        let event = sub.recv().await.unwrap();
        assert_eq!(event.event_type.as_deref(), Some("info"));
        let logs = storage.tasks().get_logs(task.id, 10).await.unwrap();
        assert_eq!(logs[0].event_type, "info");
    }

    #[tokio::test]
    async fn unknown_task_still_logs() {
        let storage = Storage::in_memory();
        let broadcaster = EventBroadcaster::new();
        let callback = task_progress_callback(storage.clone(), broadcaster.clone());

        callback(
            999,
            0,
            TaskStatus::Failed,
            "execution failed: boom".to_string(),
            None,
        )
        .await;

        let logs = storage.tasks().get_logs(999, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
    }
}
