/// HTTP API Layer
///
/// Thin REST surface over the orchestrator:
/// - Playbook publishing, listing, activation and statistics
/// - Execution start, resume, cancel, status and timeline
/// - Incident snapshots for the in-process incident gateway

use crate::error::EngineError;
use crate::incident::MemoryIncidentGateway;
use crate::orchestrator::Orchestrator;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde_json::json;
use std::sync::Arc;

// Playbook definition endpoints
pub mod workflows;

// Execution and incident endpoints
pub mod executions;

pub use executions::create_execution_routes;
pub use workflows::create_workflow_routes;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Incident snapshots served to the engine by the standalone server
    pub incidents: Arc<MemoryIncidentGateway>,
}

/// Every API route, ready for `with_state`
pub fn create_api_routes() -> Router<AppState> {
    Router::new()
        .merge(create_workflow_routes())
        .merge(create_execution_routes())
}

/// Engine error rendered as `{ "error": ... }` with a matching status code
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            EngineError::WorkflowNotFound { .. }
            | EngineError::IncidentNotFound(_)
            | EngineError::ExecutionNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidDefinition(_) | EngineError::InactiveWorkflow(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::StaleExecution { .. } | EngineError::NotAwaitingApproval { .. } => StatusCode::CONFLICT,
            EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("❌ Request failed: {}", self.0);
        } else {
            tracing::debug!("↩️ Request rejected ({}): {}", status, self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
