/// Playbook definition REST API endpoints
///
/// Publishing always creates a new immutable version; running executions keep
/// the version they started with.

use crate::api::{ApiError, AppState};
use crate::error::EngineError;
use crate::workflow::types::WorkflowDefinition;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Response for publish operations
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub id: String,
    pub version: u32,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", post(publish_workflow))
        .route("/api/workflows", get(list_workflows))
        .route("/api/workflows/{id}", get(get_workflow))
        .route("/api/workflows/{id}/versions/{version}", get(get_workflow_version))
        .route("/api/workflows/{id}/active", put(set_active))
        .route("/api/workflows/{id}/stats", get(workflow_stats))
}

/// Publish a new version of a playbook
///
/// POST /api/workflows
/// Body: a workflow definition; `version` is assigned by the server
async fn publish_workflow(
    State(state): State<AppState>,
    Json(definition): Json<WorkflowDefinition>,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    let compiled = state.orchestrator.registry().publish(definition).await?;
    let definition = &compiled.definition;

    Ok((
        StatusCode::CREATED,
        Json(PublishResponse {
            id: definition.id.clone(),
            version: definition.version,
            message: format!("Workflow '{}' published as version {}", definition.name, definition.version),
        }),
    ))
}

/// GET /api/workflows
/// Returns the latest version of every playbook
async fn list_workflows(State(state): State<AppState>) -> Json<Value> {
    let mut workflows: Vec<Value> = state.orchestrator.registry()
        .latest_definitions()
        .iter()
        .map(|compiled| {
            let d = &compiled.definition;
            json!({
                "id": d.id,
                "name": d.name,
                "category": d.category,
                "version": d.version,
                "is_active": d.is_active,
                "actions": d.actions.len(),
            })
        })
        .collect();
    workflows.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));
    Json(json!({ "workflows": workflows }))
}

async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowDefinition>, ApiError> {
    state.orchestrator.registry()
        .get(&id)
        .map(|compiled| Json((*compiled.definition).clone()))
        .ok_or_else(|| EngineError::WorkflowNotFound { id, version: None }.into())
}

async fn get_workflow_version(
    State(state): State<AppState>,
    Path((id, version)): Path<(String, u32)>,
) -> Result<Json<WorkflowDefinition>, ApiError> {
    state.orchestrator.registry()
        .get_version(&id, version)
        .map(|compiled| Json((*compiled.definition).clone()))
        .ok_or_else(|| EngineError::WorkflowNotFound { id, version: Some(version) }.into())
}

/// PUT /api/workflows/:id/active
/// Body: { "active": false }
async fn set_active(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SetActiveRequest>,
) -> Result<Json<Value>, ApiError> {
    if !state.orchestrator.registry().set_active(&id, payload.active).await? {
        return Err(EngineError::WorkflowNotFound { id, version: None }.into());
    }
    tracing::info!("🔁 Workflow {} is now {}", id, if payload.active { "active" } else { "inactive" });
    Ok(Json(json!({ "id": id, "is_active": payload.active })))
}

async fn workflow_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let stats = state.orchestrator.stats(&id).await?;
    Ok(Json(json!({ "workflow_id": id, "stats": stats })))
}
