//! Declarative resource endpoints: JSON create/list/delete plus `apply`,
//! which upserts a raw YAML document the way a CLI client submits one.

use crate::{user_id, AppState};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use maestro_core::ResourceRecord;
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Deserialize)]
pub struct CreateResourceRequest {
    #[serde(default)]
    pub workspace_id: Option<u64>,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub spec: String,
}

#[derive(Debug, Deserialize)]
pub struct ResourceQuery {
    #[serde(default)]
    pub workspace_id: Option<u64>,
    #[serde(default)]
    pub kind: Option<String>,
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

async fn default_workspace(state: &AppState, user: u64) -> Option<u64> {
    match state.storage.workspaces().list_by_user(user).await {
        Ok(workspaces) if !workspaces.is_empty() => Some(workspaces[0].id),
        _ => None,
    }
}

fn new_record(
    workspace_id: u64,
    kind: String,
    name: String,
    description: String,
    spec: String,
) -> ResourceRecord {
    let now = Utc::now();
    ResourceRecord {
        id: 0,
        workspace_id,
        kind,
        name,
        description,
        spec,
        status: "active".to_string(),
        labels: None,
        annotations: None,
        created_at: now,
        updated_at: now,
    }
}

pub async fn create_resource(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateResourceRequest>,
) -> Response {
    let user = user_id(&headers);

    if req.kind.is_empty() || req.name.is_empty() || req.spec.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "kind, name and spec are required");
    }
    let workspace_id = match req.workspace_id.filter(|id| *id != 0) {
        Some(id) => id,
        None => match default_workspace(&state, user).await {
            Some(id) => id,
            None => return error_response(StatusCode::BAD_REQUEST, "no workspace found"),
        },
    };

    // The stored spec must be a valid declaration of some kind.
    if let Err(e) = maestro_resource::parse(&req.spec) {
        return error_response(StatusCode::BAD_REQUEST, format!("invalid spec: {e}"));
    }

    match state
        .storage
        .resources()
        .exists(workspace_id, &req.name, &req.kind)
        .await
    {
        Ok(true) => return error_response(StatusCode::CONFLICT, "resource already exists"),
        Ok(false) => {}
        Err(e) => {
            error!(error = %e, "failed to check resource existence");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to create resource");
        }
    }

    let record = new_record(workspace_id, req.kind, req.name, req.description, req.spec);
    match state.storage.resources().create(record).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => {
            error!(error = %e, "failed to create resource");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to create resource")
        }
    }
}

pub async fn list_resources(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ResourceQuery>,
) -> Response {
    let user = user_id(&headers);
    let workspace_id = match query.workspace_id.filter(|id| *id != 0) {
        Some(id) => id,
        None => match default_workspace(&state, user).await {
            Some(id) => id,
            None => {
                return Json(serde_json::json!({ "resources": [] })).into_response();
            }
        },
    };
    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);

    match state
        .storage
        .resources()
        .list(workspace_id, query.kind.as_deref(), limit, offset)
        .await
    {
        Ok(resources) => Json(serde_json::json!({
            "resources": resources,
            "limit": limit,
            "offset": offset,
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "failed to list resources");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to list resources")
        }
    }
}

/// Upsert a raw YAML document: kind and name come from the parsed
/// declaration, and an existing `(workspace, kind, name)` row is updated
/// in place.
pub async fn apply_resource(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ResourceQuery>,
    body: String,
) -> Response {
    let user = user_id(&headers);
    let workspace_id = match query.workspace_id.filter(|id| *id != 0) {
        Some(id) => id,
        None => match default_workspace(&state, user).await {
            Some(id) => id,
            None => return error_response(StatusCode::BAD_REQUEST, "no workspace found"),
        },
    };

    let resource = match maestro_resource::parse(&body) {
        Ok(resource) => resource,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, format!("failed to parse YAML: {e}"))
        }
    };
    let kind = resource.kind().to_string();
    let name = resource.name().to_string();
    let description = resource
        .metadata()
        .description
        .clone()
        .unwrap_or_default();

    if let Ok(mut existing) = state
        .storage
        .resources()
        .get_by_name(workspace_id, &name, &kind)
        .await
    {
        existing.spec = body;
        existing.description = description;
        if let Err(e) = state.storage.resources().update(&existing).await {
            error!(error = %e, "failed to update resource");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to update resource");
        }
        return Json(serde_json::json!({ "action": "updated", "resource": existing }))
            .into_response();
    }

    let record = new_record(workspace_id, kind, name, description, body);
    match state.storage.resources().create(record).await {
        Ok(created) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "action": "created", "resource": created })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to create resource");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to create resource")
        }
    }
}

pub async fn delete_resource(
    State(state): State<Arc<AppState>>,
    Path(resource_id): Path<u64>,
) -> Response {
    match state.storage.resources().delete(resource_id).await {
        Ok(()) => Json(serde_json::json!({ "message": "resource deleted" })).into_response(),
        Err(e) => {
            error!(resource_id, error = %e, "failed to delete resource");
            error_response(StatusCode::NOT_FOUND, "resource not found")
        }
    }
}
