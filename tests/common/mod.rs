#![allow(dead_code)]

use async_trait::async_trait;
use playbook_engine::error::ActionError;
use playbook_engine::incident::{Incident, MemoryIncidentGateway};
use playbook_engine::orchestrator::Orchestrator;
use playbook_engine::runtime::executor::{ActionContext, ActionExecutor, ActionOutput, ActionRegistry, DryRunExecutor};
use playbook_engine::runtime::policy::RetryPolicy;
use playbook_engine::runtime::timeline::{TimelineEvent, TimelineEventType};
use playbook_engine::store::{ExecutionStore, MemoryExecutionStore};
use playbook_engine::workflow::registry::WorkflowRegistry;
use playbook_engine::workflow::types::{ExecutionSnapshot, WorkflowDefinition};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// What the scripted executor does for one action id
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed(Value),
    /// Retryable failure for the first `n` attempts, then success
    FailTimes(u32, Value),
    Permanent(String),
    /// Never returns until cancelled
    Hang,
    /// Ignores cancellation and returns after the delay
    Slow(Duration, Value),
    /// Returns the rendered parameters as output
    Echo,
}

#[derive(Debug, Default)]
pub struct Scripted {
    behaviors: Mutex<HashMap<String, Behavior>>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl Scripted {
    pub fn on(&self, action_id: &str, behavior: Behavior) {
        self.behaviors.lock().unwrap().insert(action_id.to_string(), behavior);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn count(&self, action_id: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(id, _)| id == action_id).count()
    }
}

fn object(value: Value) -> ActionOutput {
    value.as_object().cloned().unwrap_or_default()
}

#[async_trait]
impl ActionExecutor for Scripted {
    async fn execute(
        &self,
        ctx: &ActionContext,
        parameters: Map<String, Value>,
        _exec_context: &Map<String, Value>,
    ) -> Result<ActionOutput, ActionError> {
        self.calls.lock().unwrap().push((ctx.action_id.clone(), ctx.attempt));
        let behavior = self.behaviors.lock().unwrap()
            .get(&ctx.action_id)
            .cloned()
            .unwrap_or(Behavior::Succeed(json!({})));

        match behavior {
            Behavior::Succeed(output) => Ok(object(output)),
            Behavior::FailTimes(n, output) => {
                if ctx.attempt <= n {
                    Err(ActionError::Retryable(format!("remote busy (attempt {})", ctx.attempt)))
                } else {
                    Ok(object(output))
                }
            }
            Behavior::Permanent(message) => Err(ActionError::NonRetryable(message)),
            Behavior::Hang => {
                ctx.cancellation.cancelled().await;
                Err(ActionError::Cancelled)
            }
            Behavior::Slow(delay, output) => {
                tokio::time::sleep(delay).await;
                Ok(object(output))
            }
            Behavior::Echo => Ok(parameters),
        }
    }
}

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub registry: Arc<WorkflowRegistry>,
    pub incidents: Arc<MemoryIncidentGateway>,
    pub store: Arc<MemoryExecutionStore>,
    pub scripted: Arc<Scripted>,
}

pub fn policy() -> RetryPolicy {
    RetryPolicy {
        base: Duration::from_millis(100),
        ceiling: Duration::from_secs(1),
        default_timeout: Duration::from_secs(30),
    }
}

pub fn scripted_registry(scripted: &Arc<Scripted>) -> ActionRegistry {
    DryRunExecutor::ALL_TYPES
        .into_iter()
        .fold(ActionRegistry::new(), |registry, action_type| {
            registry.with(action_type, Arc::clone(scripted) as Arc<dyn ActionExecutor>)
        })
}

impl Harness {
    pub async fn new() -> Self {
        let scripted = Arc::new(Scripted::default());
        Self::with_actions(Arc::clone(&scripted), scripted_registry(&scripted)).await
    }

    pub async fn with_actions(scripted: Arc<Scripted>, actions: ActionRegistry) -> Self {
        let registry = Arc::new(WorkflowRegistry::in_memory());
        let incidents = Arc::new(MemoryIncidentGateway::new());
        let store = Arc::new(MemoryExecutionStore::new());
        incidents.upsert(Incident::new("inc-1").with_severity("high").with_category("malware")).await;

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&registry),
            Arc::new(actions),
            incidents.clone(),
            store.clone(),
            policy(),
        ));

        Self { orchestrator, registry, incidents, store, scripted }
    }

    pub async fn publish(&self, definition: Value) -> String {
        let definition: WorkflowDefinition = serde_json::from_value(definition).unwrap();
        let compiled = self.registry.publish(definition).await.unwrap();
        compiled.definition.id.clone()
    }

    pub async fn events(&self, execution_id: Uuid) -> Vec<TimelineEvent> {
        self.orchestrator.timeline(execution_id).await.unwrap()
    }

    pub async fn event_types(&self, execution_id: Uuid) -> Vec<TimelineEventType> {
        self.events(execution_id).await.into_iter().map(|e| e.event_type).collect()
    }

    /// Poll status until the execution is terminal
    pub async fn settle(&self, execution_id: Uuid) -> ExecutionSnapshot {
        for _ in 0..200 {
            let snapshot = self.orchestrator.status(execution_id).await.unwrap();
            if snapshot.status.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("execution {} never settled", execution_id);
    }

    pub async fn stored_count(&self, incident_id: &str) -> usize {
        self.store.list_for_incident(incident_id).await.unwrap().len()
    }
}

pub fn linear_playbook() -> Value {
    json!({
        "id": "pb-malware",
        "name": "Malware containment",
        "category": "malware",
        "actions": [
            { "action_id": "isolate", "name": "Isolate host", "order": 1, "action_type": "isolate_asset" },
            { "action_id": "collect", "name": "Collect logs", "order": 2, "action_type": "collect_logs" },
            { "action_id": "notify", "name": "Notify SOC", "order": 3, "action_type": "send_notification" }
        ]
    })
}

/// Containment behind an approval gate on the entry action
pub fn gated() -> Value {
    json!({
        "id": "pb-gated",
        "name": "Gated containment",
        "actions": [
            { "action_id": "isolate", "order": 1, "action_type": "isolate_asset",
              "approval_required": true, "approval_role": "incident_commander" },
            { "action_id": "notify", "order": 2, "action_type": "send_notification" }
        ]
    })
}
