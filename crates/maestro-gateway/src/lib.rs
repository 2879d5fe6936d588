//! HTTP/WebSocket surface over the task pipeline: submission, inspection,
//! cancellation and the per-task event stream. Authentication lives in
//! front of this router; the caller identity arrives as an `x-user-id`
//! header.

pub mod handlers;
pub mod resources;
pub mod ws;

use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use maestro_broadcast::EventBroadcaster;
use maestro_core::ProgressCallback;
use maestro_orchestrator::Orchestrator;
use maestro_storage::Storage;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub storage: Storage,
    pub orchestrator: Arc<Orchestrator>,
    pub broadcaster: Arc<EventBroadcaster>,
    /// Lifecycle callback attached to every submitted task.
    pub callback: ProgressCallback,
}

/// Build the gateway router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/tasks",
            post(handlers::create_task).get(handlers::list_tasks),
        )
        .route(
            "/api/tasks/{id}",
            get(handlers::get_task).delete(handlers::delete_task),
        )
        .route("/api/tasks/{id}/cancel", post(handlers::cancel_task))
        .route("/api/tasks/{id}/logs", get(handlers::get_task_logs))
        .route("/api/tasks/{id}/stream", get(ws::stream_task))
        .route(
            "/api/resources",
            post(resources::create_resource).get(resources::list_resources),
        )
        .route("/api/resources/apply", post(resources::apply_resource))
        .route(
            "/api/resources/{id}",
            axum::routing::delete(resources::delete_resource),
        )
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({"status": "ok", "service": "maestro"}))
}

/// Caller identity, injected by the auth layer in front of this router.
pub(crate) fn user_id(headers: &HeaderMap) -> u64 {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(1)
}
