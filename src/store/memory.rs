//! In-memory execution store

use crate::runtime::timeline::TimelineEvent;
use crate::store::ExecutionStore;
use crate::workflow::types::{AutomationStats, ExecutionStatus, WorkflowExecution};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryExecutionStore {
    executions: RwLock<HashMap<Uuid, WorkflowExecution>>,
    events: RwLock<HashMap<Uuid, BTreeMap<u64, TimelineEvent>>>,
    stats: RwLock<HashMap<String, AutomationStats>>,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn save(&self, execution: &WorkflowExecution) -> Result<()> {
        self.executions.write().await.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<WorkflowExecution>> {
        Ok(self.executions.read().await.get(&id).cloned())
    }

    async fn list_by_status(&self, statuses: &[ExecutionStatus]) -> Result<Vec<WorkflowExecution>> {
        let mut found: Vec<WorkflowExecution> = self.executions.read().await
            .values()
            .filter(|e| statuses.contains(&e.status))
            .cloned()
            .collect();
        found.sort_by_key(|e| e.created_at);
        Ok(found)
    }

    async fn list_for_incident(&self, incident_id: &str) -> Result<Vec<WorkflowExecution>> {
        let mut found: Vec<WorkflowExecution> = self.executions.read().await
            .values()
            .filter(|e| e.incident_id == incident_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.created_at);
        Ok(found)
    }

    async fn append_event(&self, event: &TimelineEvent) -> Result<()> {
        let mut events = self.events.write().await;
        let log = events.entry(event.execution_id).or_default();
        if log.contains_key(&event.sequence) {
            return Err(anyhow::anyhow!(
                "Duplicate timeline sequence {} for execution {}", event.sequence, event.execution_id
            ));
        }
        log.insert(event.sequence, event.clone());
        Ok(())
    }

    async fn events(&self, execution_id: Uuid) -> Result<Vec<TimelineEvent>> {
        Ok(self.events.read().await
            .get(&execution_id)
            .map(|log| log.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn record_terminal(&self, workflow_id: &str, status: ExecutionStatus, duration_ms: i64) -> Result<AutomationStats> {
        let mut stats = self.stats.write().await;
        let entry = stats.entry(workflow_id.to_string()).or_insert_with(|| AutomationStats {
            workflow_id: workflow_id.to_string(),
            ..Default::default()
        });
        entry.record(status, duration_ms);
        Ok(entry.clone())
    }

    async fn stats(&self, workflow_id: &str) -> Result<Option<AutomationStats>> {
        Ok(self.stats.read().await.get(workflow_id).cloned())
    }
}
