use crate::{user_id, AppState};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use maestro_core::{MaestroError, Task, TaskStatus};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub prompt: String,
    pub resource_type: String,
    pub resource_name: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub git_url: Option<String>,
    #[serde(default)]
    pub branch_name: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

/// Load a task and enforce ownership.
async fn owned_task(state: &AppState, headers: &HeaderMap, task_id: u64) -> Result<Task, Response> {
    let task = state
        .storage
        .tasks()
        .get_by_id(task_id)
        .await
        .map_err(|_| error_response(StatusCode::NOT_FOUND, "task not found"))?;
    if task.user_id != user_id(headers) {
        return Err(error_response(StatusCode::FORBIDDEN, "access denied"));
    }
    Ok(task)
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateTaskRequest>,
) -> Response {
    let user = user_id(&headers);

    if req.title.is_empty() || req.prompt.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "title and prompt are required");
    }
    if !matches!(req.resource_type.as_str(), "robot" | "team") {
        return error_response(
            StatusCode::BAD_REQUEST,
            "resource_type must be robot or team",
        );
    }

    // Fall back to the user's default workspace.
    let workspace_id = match req.workspace_id.filter(|id| *id != 0) {
        Some(id) => id,
        None => match state.storage.workspaces().list_by_user(user).await {
            Ok(workspaces) if !workspaces.is_empty() => workspaces[0].id,
            _ => return error_response(StatusCode::BAD_REQUEST, "no workspace found"),
        },
    };

    let mut task = Task::new(
        workspace_id,
        user,
        req.title,
        req.prompt,
        req.resource_type,
        req.resource_name,
    );
    task.description = req.description;
    task.mode = req.mode;
    task.git_url = req.git_url;
    task.branch_name = req.branch_name;

    let task = match state.storage.tasks().create(task).await {
        Ok(task) => task,
        Err(e) => {
            error!(error = %e, "failed to create task");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to create task");
        }
    };

    if let Err(e) = state
        .orchestrator
        .submit_task(task.clone(), state.callback.clone())
    {
        error!(task_id = task.id, error = %e, "failed to submit task");
        let status = match e {
            MaestroError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        return error_response(status, e.to_string());
    }

    (StatusCode::CREATED, Json(task)).into_response()
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<u64>,
) -> Response {
    match owned_task(&state, &headers, task_id).await {
        Ok(task) => Json(task).into_response(),
        Err(resp) => resp,
    }
}

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(page): Query<PageQuery>,
) -> Response {
    let limit = page.limit.unwrap_or(20);
    let offset = page.offset.unwrap_or(0);

    match state
        .storage
        .tasks()
        .list_by_user(user_id(&headers), limit, offset)
        .await
    {
        Ok(tasks) => Json(serde_json::json!({
            "tasks": tasks,
            "limit": limit,
            "offset": offset,
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "failed to list tasks");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to list tasks")
        }
    }
}

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<u64>,
) -> Response {
    if let Err(resp) = owned_task(&state, &headers, task_id).await {
        return resp;
    }
    match state.storage.tasks().delete(task_id).await {
        Ok(()) => Json(serde_json::json!({ "message": "task deleted" })).into_response(),
        Err(e) => {
            error!(task_id, error = %e, "failed to delete task");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to delete task")
        }
    }
}

pub async fn cancel_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<u64>,
) -> Response {
    let mut task = match owned_task(&state, &headers, task_id).await {
        Ok(task) => task,
        Err(resp) => return resp,
    };

    if let Err(e) = state.orchestrator.cancel_task(task_id).await {
        error!(task_id, error = %e, "failed to cancel task");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to cancel task");
    }

    task.status = TaskStatus::Cancelled;
    if let Err(e) = state.storage.tasks().update(&task).await {
        error!(task_id, error = %e, "failed to persist cancelled status");
    }

    Json(serde_json::json!({ "message": "task cancelled" })).into_response()
}

pub async fn get_task_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<u64>,
    Query(page): Query<PageQuery>,
) -> Response {
    if let Err(resp) = owned_task(&state, &headers, task_id).await {
        return resp;
    }
    let limit = page.limit.unwrap_or(100);

    match state.storage.tasks().get_logs(task_id, limit).await {
        Ok(logs) => Json(serde_json::json!({ "logs": logs })).into_response(),
        Err(e) => {
            error!(task_id, error = %e, "failed to get logs");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to get logs")
        }
    }
}
