//! The per-task streaming endpoint. On connect the client gets a status
//! snapshot and a connected frame, then every broadcast event as its own
//! message; a 2-second poll of the task record closes the stream with a
//! `complete` frame once the task reaches a terminal state.

use crate::{user_id, AppState};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use maestro_broadcast::TaskEvent;
use maestro_core::Task;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub async fn stream_task(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<u64>,
) -> Response {
    let task = match state.storage.tasks().get_by_id(task_id).await {
        Ok(task) => task,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    if task.user_id != user_id(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }

    ws.on_upgrade(move |socket| handle_stream(socket, state, task))
}

fn status_frame(task: &Task) -> String {
    serde_json::json!({
        "type": "status",
        "task_id": task.id,
        "status": task.status,
        "progress": task.progress,
    })
    .to_string()
}

/// Event frame shape expected by stream clients: the runtime event rides
/// in `message` as a JSON string.
fn event_frame(event: &TaskEvent) -> String {
    let mut message = serde_json::json!({
        "type": event.event_type,
        "content": event.content,
    });
    if let Some(details) = &event.details {
        message["details"] = details.clone();
    }

    serde_json::json!({
        "type": event.kind,
        "task_id": event.task_id,
        "event_type": event.event_type,
        "progress": event.progress,
        "status": event.status,
        "message": message.to_string(),
    })
    .to_string()
}

async fn handle_stream(socket: WebSocket, state: Arc<AppState>, task: Task) {
    let task_id = task.id;
    info!(task_id, "stream connected");

    let (mut sender, mut receiver) = socket.split();

    // Initial snapshot plus a connected confirmation.
    if sender
        .send(Message::Text(status_frame(&task).into()))
        .await
        .is_err()
    {
        return;
    }
    let connected = serde_json::json!({
        "type": "log",
        "task_id": task_id,
        "event_type": "connected",
        "message": serde_json::json!({
            "type": "connected",
            "content": "stream connected, waiting for events...",
        }).to_string(),
    });
    if sender
        .send(Message::Text(connected.to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    let mut subscription = state.broadcaster.subscribe(task_id);

    // The read side only detects disconnects; inbound payloads are dropped.
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + STATUS_POLL_INTERVAL,
        STATUS_POLL_INTERVAL,
    );

    loop {
        tokio::select! {
            _ = &mut reader => {
                info!(task_id, "stream client disconnected");
                break;
            }

            event = subscription.recv() => {
                let Some(event) = event else { break };
                if sender
                    .send(Message::Text(event_frame(&event).into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }

            _ = ticker.tick() => {
                let Ok(current) = state.storage.tasks().get_by_id(task_id).await else {
                    continue;
                };
                if sender
                    .send(Message::Text(status_frame(&current).into()))
                    .await
                    .is_err()
                {
                    break;
                }

                if current.status.is_terminal() {
                    let complete = serde_json::json!({
                        "type": "complete",
                        "task_id": task_id,
                        "status": current.status,
                        "result": current.result,
                    });
                    let _ = sender.send(Message::Text(complete.to_string().into())).await;
                    break;
                }
            }
        }
    }

    state.broadcaster.unsubscribe(&subscription);
    reader.abort();
    info!(task_id, "stream closed");
}
