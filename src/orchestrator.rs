//! Workflow orchestrator
//!
//! The public face of the engine: start, resume, cancel and status, plus
//! auto-triggering, SLA checks, crash recovery and statistics. It resolves
//! definitions and incidents, creates executions, and hands them to the
//! `ExecutionStateMachine`. Live executions are kept in a lock-free map so
//! `status` never waits on a running action.

use crate::error::{EngineError, Result};
use crate::incident::IncidentGateway;
use crate::runtime::engine::{ExecutionHandle, ExecutionStateMachine, Terminal};
use crate::runtime::executor::ActionRegistry;
use crate::runtime::policy::RetryPolicy;
use crate::runtime::timeline::{TimelineEvent, TimelineEventType, TimelineRecorder};
use crate::store::ExecutionStore;
use crate::workflow::graph::CompiledWorkflow;
use crate::workflow::registry::WorkflowRegistry;
use crate::workflow::types::{
    ApprovalRecord, AutomationStats, ExecutionFailure, ExecutionSnapshot, ExecutionStatus, FailureKind,
    WorkflowDefinition, WorkflowExecution,
};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Executions that are running or parked at an approval gate
#[derive(Debug, Default)]
struct LiveExecutions {
    handles: ArcSwap<HashMap<Uuid, Arc<ExecutionHandle>>>,
}

impl LiveExecutions {
    /// Insert unless already live; returns whichever handle is registered
    fn insert(&self, handle: Arc<ExecutionHandle>) -> Arc<ExecutionHandle> {
        self.handles.rcu(|current| {
            let mut next = (**current).clone();
            next.entry(handle.id).or_insert_with(|| Arc::clone(&handle));
            next
        });
        self.get(handle.id).unwrap_or(handle)
    }

    fn get(&self, id: Uuid) -> Option<Arc<ExecutionHandle>> {
        self.handles.load().get(&id).cloned()
    }

    fn remove(&self, id: Uuid) {
        self.handles.rcu(|current| {
            let mut next = (**current).clone();
            next.remove(&id);
            next
        });
    }

    fn all(&self) -> Vec<Arc<ExecutionHandle>> {
        self.handles.load().values().cloned().collect()
    }

    /// Drop the handle once its execution is terminal; the store keeps the record
    fn settle(&self, handle: &ExecutionHandle) {
        if handle.snapshot().status.is_terminal() {
            self.remove(handle.id);
        }
    }
}

pub struct Orchestrator {
    registry: Arc<WorkflowRegistry>,
    incidents: Arc<dyn IncidentGateway>,
    store: Arc<dyn ExecutionStore>,
    timeline: TimelineRecorder,
    engine: ExecutionStateMachine,
    live: Arc<LiveExecutions>,
}

impl Orchestrator {
    /// Wire the engine together; spawns the timeline writer, so call from within a tokio runtime
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        actions: Arc<ActionRegistry>,
        incidents: Arc<dyn IncidentGateway>,
        store: Arc<dyn ExecutionStore>,
        policy: RetryPolicy,
    ) -> Self {
        let timeline = TimelineRecorder::spawn(Arc::clone(&store), Arc::clone(&incidents));
        let engine = ExecutionStateMachine::new(
            actions,
            Arc::clone(&incidents),
            Arc::clone(&store),
            timeline.clone(),
            policy,
        );
        Self {
            registry,
            incidents,
            store,
            timeline,
            engine,
            live: Arc::new(LiveExecutions::default()),
        }
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    /// Start the latest version of a published workflow against an incident
    ///
    /// Runs until the first approval gate or a terminal state before returning.
    pub async fn start(&self, workflow_id: &str, incident_id: &str, triggered_by: &str) -> Result<ExecutionSnapshot> {
        let workflow = self.registry.get(workflow_id).ok_or_else(|| EngineError::WorkflowNotFound {
            id: workflow_id.to_string(),
            version: None,
        })?;
        self.launch(workflow, incident_id, triggered_by).await
    }

    /// Start an unpublished definition; it is validated here instead of at publish
    pub async fn start_definition(
        &self,
        definition: WorkflowDefinition,
        incident_id: &str,
        triggered_by: &str,
    ) -> Result<ExecutionSnapshot> {
        let workflow = Arc::new(CompiledWorkflow::compile(definition)?);
        self.launch(workflow, incident_id, triggered_by).await
    }

    async fn launch(&self, workflow: Arc<CompiledWorkflow>, incident_id: &str, triggered_by: &str) -> Result<ExecutionSnapshot> {
        let definition = Arc::clone(&workflow.definition);
        if !definition.is_active {
            return Err(EngineError::InactiveWorkflow(definition.id.clone()));
        }
        if self.incidents.get_incident_snapshot(incident_id).await?.is_none() {
            return Err(EngineError::IncidentNotFound(incident_id.to_string()));
        }

        let mut exec = WorkflowExecution::new(&definition, incident_id, triggered_by);
        let created = TimelineEvent::new(
            &mut exec,
            TimelineEventType::ExecutionCreated,
            format!("Playbook '{}' v{} attached by {}", definition.name, definition.version, triggered_by),
        )
        .with_meta("workflow_id", definition.id.clone())
        .with_meta("workflow_version", definition.version);
        exec.transition(ExecutionStatus::Running);
        let started = TimelineEvent::new(
            &mut exec,
            TimelineEventType::ExecutionStarted,
            format!("Starting at '{}'", workflow.entry()),
        )
        .with_action(workflow.entry());

        self.store.save(&exec).await?;
        self.timeline.record(created).await?;
        self.timeline.record(started).await?;
        tracing::info!("🆕 Execution {} of '{}' v{} for incident {}", exec.id, definition.id, definition.version, incident_id);

        let handle = self.live.insert(Arc::new(ExecutionHandle::new(workflow, exec)));
        let outcome = self.engine.run(Arc::clone(&handle)).await;
        self.live.settle(&handle);
        outcome?;
        Ok((*handle.snapshot()).clone())
    }

    /// Record an approval decision and continue (or fail) the execution
    pub async fn resume(&self, id: Uuid, approved: bool, approver: &str) -> Result<ExecutionSnapshot> {
        let handle = self.handle(id).await?;
        {
            let mut exec = handle.lock().await;
            if exec.status.is_terminal() {
                return Err(EngineError::StaleExecution { id, status: exec.status });
            }
            let gated = match (exec.status, exec.current_action_id.clone()) {
                (ExecutionStatus::WaitingApproval, Some(action_id)) => action_id,
                (status, _) => return Err(EngineError::NotAwaitingApproval { id, status }),
            };

            exec.approvals.push(ApprovalRecord {
                action_id: gated.clone(),
                approved,
                approver: approver.to_string(),
                decided_at: Utc::now(),
            });

            if !approved {
                let event = TimelineEvent::new(
                    &mut exec,
                    TimelineEventType::ApprovalDenied,
                    format!("{} denied '{}'", approver, gated),
                )
                .with_action(&gated)
                .with_meta("approver", approver);
                self.timeline.record(event).await?;

                let failure = ExecutionFailure {
                    kind: FailureKind::ApprovalDenied,
                    action_id: Some(gated.clone()),
                    message: format!("approval for '{}' denied by {}", gated, approver),
                };
                self.engine.finish(&handle, &mut exec, Terminal::Failed(failure)).await?;
                drop(exec);
                self.live.settle(&handle);
                tracing::info!("🚫 Execution {} denied at '{}' by {}", id, gated, approver);
                return Ok((*handle.snapshot()).clone());
            }

            exec.transition(ExecutionStatus::Running);
            let event = TimelineEvent::new(
                &mut exec,
                TimelineEventType::ApprovalGranted,
                format!("{} approved '{}'", approver, gated),
            )
            .with_action(&gated)
            .with_meta("approver", approver);
            self.store.save(&exec).await?;
            handle.publish(&exec);
            self.timeline.record(event).await?;
            tracing::info!("👍 Execution {} approved at '{}' by {}", id, gated, approver);
        }

        let outcome = self.engine.run(Arc::clone(&handle)).await;
        self.live.settle(&handle);
        outcome?;
        Ok((*handle.snapshot()).clone())
    }

    /// Cancel a non-terminal execution without waiting for in-flight actions
    pub async fn cancel(&self, id: Uuid, reason: &str) -> Result<ExecutionSnapshot> {
        let handle = self.handle(id).await?;
        let mut exec = handle.lock().await;
        if exec.status.is_terminal() {
            return Err(EngineError::StaleExecution { id, status: exec.status });
        }

        self.engine.finish(&handle, &mut exec, Terminal::Cancelled(reason.to_string())).await?;
        drop(exec);
        self.live.remove(id);
        tracing::info!("🛑 Execution {} cancelled: {}", id, reason);
        Ok((*handle.snapshot()).clone())
    }

    /// Read-only snapshot; live executions are served without locking
    pub async fn status(&self, id: Uuid) -> Result<ExecutionSnapshot> {
        if let Some(handle) = self.live.get(id) {
            return Ok((*handle.snapshot()).clone());
        }
        self.store
            .load(id)
            .await?
            .map(|exec| ExecutionSnapshot::from(&exec))
            .ok_or(EngineError::ExecutionNotFound(id))
    }

    /// Audit trail of one execution
    pub async fn timeline(&self, id: Uuid) -> Result<Vec<TimelineEvent>> {
        self.timeline.flush().await;
        let events = self.store.events(id).await?;
        if events.is_empty() && self.store.load(id).await?.is_none() {
            return Err(EngineError::ExecutionNotFound(id));
        }
        Ok(events)
    }

    pub async fn list_executions(&self, incident_id: &str) -> Result<Vec<ExecutionSnapshot>> {
        let stored = self.store.list_for_incident(incident_id).await?;
        Ok(stored
            .iter()
            .map(|exec| match self.live.get(exec.id) {
                Some(handle) => (*handle.snapshot()).clone(),
                None => ExecutionSnapshot::from(exec),
            })
            .collect())
    }

    /// Start every active auto-trigger playbook whose conditions match the incident
    pub async fn trigger_for_incident(&self, incident_id: &str, triggered_by: &str) -> Result<Vec<ExecutionSnapshot>> {
        let incident = self.incidents
            .get_incident_snapshot(incident_id)
            .await?
            .ok_or_else(|| EngineError::IncidentNotFound(incident_id.to_string()))?;

        let mut matching: Vec<Arc<CompiledWorkflow>> = self.registry
            .latest_definitions()
            .into_iter()
            .filter(|workflow| {
                let definition = &workflow.definition;
                definition.is_active
                    && definition.trigger_conditions.auto_trigger
                    && definition.trigger_conditions.matches(
                        incident.severity.as_deref(),
                        incident.category.as_deref(),
                        incident.priority.as_deref(),
                    )
            })
            .collect();
        matching.sort_by(|a, b| a.definition.id.cmp(&b.definition.id));

        tracing::info!("🎯 {} playbooks match incident {}", matching.len(), incident_id);

        let mut started = Vec::with_capacity(matching.len());
        for workflow in matching {
            let workflow_id = workflow.definition.id.clone();
            match self.launch(workflow, incident_id, triggered_by).await {
                Ok(snapshot) => started.push(snapshot),
                Err(e) => tracing::error!("❌ Auto-trigger of '{}' for incident {} failed: {}", workflow_id, incident_id, e),
            }
        }
        Ok(started)
    }

    /// Record an SLA breach on every live execution whose incident deadline has passed
    ///
    /// Each execution records at most one breach. Returns how many were recorded.
    pub async fn check_sla(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut breaches = 0;

        for handle in self.live.all() {
            if handle.snapshot().status.is_terminal() {
                continue;
            }
            let Some(incident) = self.incidents.get_incident_snapshot(&handle.incident_id).await? else {
                continue;
            };
            let passed = [
                ("response", incident.sla.response_deadline),
                ("resolution", incident.sla.resolution_deadline),
            ]
            .into_iter()
            .find_map(|(kind, deadline)| deadline.filter(|d| *d < now).map(|d| (kind, d)));
            let Some((kind, deadline)) = passed else {
                continue;
            };

            let mut exec = handle.lock().await;
            if exec.status.is_terminal() || exec.sla_breach_recorded {
                continue;
            }
            exec.sla_breach_recorded = true;
            let description = format!(
                "{} deadline {} passed while playbook '{}' was {}",
                kind, deadline.to_rfc3339(), exec.workflow_id, exec.status
            );
            let event = TimelineEvent::new(&mut exec, TimelineEventType::SlaBreached, description)
                .with_meta("deadline", deadline.to_rfc3339())
                .with_meta("deadline_kind", kind);
            self.store.save(&exec).await?;
            handle.publish(&exec);
            self.timeline.record(event).await?;
            drop(exec);

            self.incidents.mark_sla_breached(&handle.incident_id).await?;
            tracing::warn!("⏱️ SLA {} deadline breached for incident {} (execution {})", kind, handle.incident_id, handle.id);
            breaches += 1;
        }

        Ok(breaches)
    }

    /// Reload executions left running or waiting by a previous process
    ///
    /// Running ones are driven again in the background; waiting ones stay
    /// parked until `resume`. Returns how many were adopted.
    pub async fn recover(&self) -> Result<usize> {
        let unfinished = self.store
            .list_by_status(&[ExecutionStatus::Running, ExecutionStatus::WaitingApproval])
            .await?;

        let mut adopted = 0;
        for exec in unfinished {
            if self.live.get(exec.id).is_some() {
                continue;
            }
            let (id, status) = (exec.id, exec.status);
            let handle = match self.adopt(exec).await {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::error!("❌ Cannot recover execution {}: {}", id, e);
                    continue;
                }
            };
            adopted += 1;

            if status == ExecutionStatus::Running {
                let engine = self.engine.clone();
                let live = Arc::clone(&self.live);
                tokio::spawn(async move {
                    if let Err(e) = engine.run(Arc::clone(&handle)).await {
                        tracing::error!("❌ Recovered execution {} stopped: {}", handle.id, e);
                    }
                    live.settle(&handle);
                });
            }
        }

        tracing::info!("♻️ Recovered {} unfinished executions", adopted);
        Ok(adopted)
    }

    pub async fn stats(&self, workflow_id: &str) -> Result<Option<AutomationStats>> {
        Ok(self.store.stats(workflow_id).await?)
    }

    /// Live handle, or the stored record adopted as live when it is still open
    async fn handle(&self, id: Uuid) -> Result<Arc<ExecutionHandle>> {
        if let Some(handle) = self.live.get(id) {
            return Ok(handle);
        }
        let exec = self.store.load(id).await?.ok_or(EngineError::ExecutionNotFound(id))?;
        if exec.status.is_terminal() {
            return Err(EngineError::StaleExecution { id, status: exec.status });
        }
        self.adopt(exec).await
    }

    async fn adopt(&self, mut exec: WorkflowExecution) -> Result<Arc<ExecutionHandle>> {
        let workflow = self.registry
            .get_version(&exec.workflow_id, exec.workflow_version)
            .ok_or_else(|| EngineError::WorkflowNotFound {
                id: exec.workflow_id.clone(),
                version: Some(exec.workflow_version),
            })?;

        // Informational events may have landed after the last save
        if let Some(last) = self.store.events(exec.id).await?.last() {
            exec.event_seq = exec.event_seq.max(last.sequence);
        }

        tracing::info!("♻️ Adopting execution {} ({}) of '{}' v{}", exec.id, exec.status, exec.workflow_id, exec.workflow_version);
        Ok(self.live.insert(Arc::new(ExecutionHandle::new(workflow, exec))))
    }
}
