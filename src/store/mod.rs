//! Execution persistence
//!
//! A `WorkflowExecution` document plus its ordered audit events is the unit
//! of durability. Stores also hold the per-workflow automation statistics
//! projection, updated once per terminal transition.

pub mod memory;
pub mod sqlite;

use crate::runtime::timeline::TimelineEvent;
use crate::workflow::types::{AutomationStats, ExecutionStatus, WorkflowExecution};
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

pub use memory::MemoryExecutionStore;
pub use sqlite::SqliteExecutionStore;

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert or replace the execution document
    async fn save(&self, execution: &WorkflowExecution) -> Result<()>;

    async fn load(&self, id: Uuid) -> Result<Option<WorkflowExecution>>;

    /// Executions currently in any of `statuses` (crash recovery)
    async fn list_by_status(&self, statuses: &[ExecutionStatus]) -> Result<Vec<WorkflowExecution>>;

    async fn list_for_incident(&self, incident_id: &str) -> Result<Vec<WorkflowExecution>>;

    /// Append one audit event; `(execution_id, sequence)` is unique
    async fn append_event(&self, event: &TimelineEvent) -> Result<()>;

    /// Audit events of one execution in sequence order
    async fn events(&self, execution_id: Uuid) -> Result<Vec<TimelineEvent>>;

    /// Fold a terminal execution into the workflow's statistics and return them
    async fn record_terminal(&self, workflow_id: &str, status: ExecutionStatus, duration_ms: i64) -> Result<AutomationStats>;

    async fn stats(&self, workflow_id: &str) -> Result<Option<AutomationStats>>;
}
