/// Execution and incident REST API endpoints

use crate::api::{ApiError, AppState};
use crate::incident::Incident;
use crate::runtime::timeline::TimelineEvent;
use crate::workflow::types::ExecutionSnapshot;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

fn default_actor() -> String {
    "api".to_string()
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub workflow_id: String,
    pub incident_id: String,
    #[serde(default = "default_actor")]
    pub triggered_by: String,
}

#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    pub approved: bool,
    pub approver: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    #[serde(default = "default_actor")]
    pub triggered_by: String,
}

pub fn create_execution_routes() -> Router<AppState> {
    Router::new()
        .route("/api/executions", post(start_execution))
        .route("/api/executions/{id}", get(execution_status))
        .route("/api/executions/{id}/timeline", get(execution_timeline))
        .route("/api/executions/{id}/resume", post(resume_execution))
        .route("/api/executions/{id}/cancel", post(cancel_execution))
        .route("/api/incidents/{id}", put(upsert_incident))
        .route("/api/incidents/{id}/executions", get(incident_executions))
        .route("/api/incidents/{id}/trigger", post(trigger_playbooks))
}

/// Start a playbook against an incident
///
/// POST /api/executions
/// Body: { "workflow_id": "...", "incident_id": "...", "triggered_by": "..." }
/// Returns the snapshot at the first approval gate or terminal state
async fn start_execution(
    State(state): State<AppState>,
    Json(payload): Json<StartRequest>,
) -> Result<(StatusCode, Json<ExecutionSnapshot>), ApiError> {
    let snapshot = state.orchestrator
        .start(&payload.workflow_id, &payload.incident_id, &payload.triggered_by)
        .await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn execution_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExecutionSnapshot>, ApiError> {
    Ok(Json(state.orchestrator.status(id).await?))
}

async fn execution_timeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TimelineEvent>>, ApiError> {
    Ok(Json(state.orchestrator.timeline(id).await?))
}

/// POST /api/executions/:id/resume
/// Body: { "approved": true, "approver": "alice" }
async fn resume_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResumeRequest>,
) -> Result<Json<ExecutionSnapshot>, ApiError> {
    Ok(Json(state.orchestrator.resume(id, payload.approved, &payload.approver).await?))
}

async fn cancel_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<ExecutionSnapshot>, ApiError> {
    Ok(Json(state.orchestrator.cancel(id, &payload.reason).await?))
}

/// PUT /api/incidents/:id
/// Body: an incident snapshot; the path id wins over the body
async fn upsert_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut incident): Json<Incident>,
) -> Json<Value> {
    incident.id = id.clone();
    state.incidents.upsert(incident).await;
    Json(json!({ "id": id }))
}

async fn incident_executions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ExecutionSnapshot>>, ApiError> {
    Ok(Json(state.orchestrator.list_executions(&id).await?))
}

/// POST /api/incidents/:id/trigger
/// Starts every active auto-trigger playbook matching the incident
async fn trigger_playbooks(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<TriggerRequest>,
) -> Result<Json<Vec<ExecutionSnapshot>>, ApiError> {
    Ok(Json(state.orchestrator.trigger_for_incident(&id, &payload.triggered_by).await?))
}
