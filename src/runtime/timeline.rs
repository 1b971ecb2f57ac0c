//! Timeline recorder
//!
//! Every lifecycle change of an execution becomes a `TimelineEvent` with a
//! per-execution sequence number. Events go through a single writer task so
//! they land in the execution audit log and on the incident timeline in the
//! order they were recorded. `record` waits until the audit row is durable;
//! `notify` is fire-and-forget for purely informational events.

use crate::incident::IncidentGateway;
use crate::store::ExecutionStore;
use crate::workflow::types::WorkflowExecution;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventType {
    ExecutionCreated,
    ExecutionStarted,
    ActionStarted,
    ActionSucceeded,
    ActionFailed,
    ActionTimedOut,
    ActionRetryScheduled,
    BranchTaken,
    ApprovalRequested,
    ApprovalGranted,
    ApprovalDenied,
    ContextConflict,
    ActionResultDiscarded,
    SlaBreached,
    ExecutionCompleted,
    ExecutionFailed,
    ExecutionCancelled,
}

impl TimelineEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineEventType::ExecutionCreated => "execution_created",
            TimelineEventType::ExecutionStarted => "execution_started",
            TimelineEventType::ActionStarted => "action_started",
            TimelineEventType::ActionSucceeded => "action_succeeded",
            TimelineEventType::ActionFailed => "action_failed",
            TimelineEventType::ActionTimedOut => "action_timed_out",
            TimelineEventType::ActionRetryScheduled => "action_retry_scheduled",
            TimelineEventType::BranchTaken => "branch_taken",
            TimelineEventType::ApprovalRequested => "approval_requested",
            TimelineEventType::ApprovalGranted => "approval_granted",
            TimelineEventType::ApprovalDenied => "approval_denied",
            TimelineEventType::ContextConflict => "context_conflict",
            TimelineEventType::ActionResultDiscarded => "action_result_discarded",
            TimelineEventType::SlaBreached => "sla_breached",
            TimelineEventType::ExecutionCompleted => "execution_completed",
            TimelineEventType::ExecutionFailed => "execution_failed",
            TimelineEventType::ExecutionCancelled => "execution_cancelled",
        }
    }
}

/// Append-only audit entry for an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Strictly increasing within one execution
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: TimelineEventType,
    pub description: String,
    pub execution_id: Uuid,
    pub incident_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TimelineEvent {
    /// New event for `execution`, taking the next sequence number from it
    pub fn new(execution: &mut WorkflowExecution, event_type: TimelineEventType, description: impl Into<String>) -> Self {
        Self {
            sequence: execution.next_sequence(),
            timestamp: Utc::now(),
            event_type,
            description: description.into(),
            execution_id: execution.id,
            incident_id: execution.incident_id.clone(),
            action_id: None,
            metadata: Map::new(),
        }
    }

    pub fn with_action(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

enum Job {
    Write {
        event: TimelineEvent,
        ack: Option<oneshot::Sender<Result<()>>>,
    },
    Flush(oneshot::Sender<()>),
}

/// Handle to the background timeline writer
#[derive(Debug, Clone)]
pub struct TimelineRecorder {
    tx: mpsc::UnboundedSender<Job>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::Write { event, .. } => write!(f, "Write({}#{})", event.execution_id, event.sequence),
            Job::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl TimelineRecorder {
    /// Spawn the writer task; it stops once every handle is dropped
    pub fn spawn(store: Arc<dyn ExecutionStore>, incidents: Arc<dyn IncidentGateway>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    Job::Write { event, ack } => {
                        let result = write_event(store.as_ref(), incidents.as_ref(), &event).await;
                        match ack {
                            Some(ack) => {
                                let _ = ack.send(result);
                            }
                            None => {
                                if let Err(e) = result {
                                    tracing::error!("❌ Dropped timeline event {} #{}: {}",
                                        event.execution_id, event.sequence, e);
                                }
                            }
                        }
                    }
                    Job::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            tracing::debug!("🛑 Timeline writer stopped");
        });

        Self { tx }
    }

    /// Record an event and wait until it is persisted in the audit log
    pub async fn record(&self, event: TimelineEvent) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Job::Write { event, ack: Some(ack) })
            .map_err(|_| anyhow::anyhow!("Timeline writer is not running"))?;
        done.await
            .map_err(|_| anyhow::anyhow!("Timeline writer stopped before acknowledging"))?
    }

    /// Queue an informational event without waiting
    pub fn notify(&self, event: TimelineEvent) {
        if self.tx.send(Job::Write { event, ack: None }).is_err() {
            tracing::warn!("⚠️ Timeline writer is not running, event dropped");
        }
    }

    /// Wait until every event queued so far has been written
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Job::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

/// Audit log first; a missing or closed incident must not lose the audit row
async fn write_event(store: &dyn ExecutionStore, incidents: &dyn IncidentGateway, event: &TimelineEvent) -> Result<()> {
    store.append_event(event).await?;

    if let Err(e) = incidents.append_timeline_event(&event.incident_id, event).await {
        tracing::warn!("⚠️ Incident {} did not accept timeline event {}: {}",
            event.incident_id, event.event_type.as_str(), e);
    }

    tracing::debug!("📝 [{}#{}] {} {}", event.execution_id, event.sequence, event.event_type.as_str(), event.description);
    Ok(())
}
