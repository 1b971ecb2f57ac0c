//! Action executor capability and registry
//!
//! The engine never performs side effects itself. Each `ActionType` is
//! dispatched to an `ActionExecutor` supplied by the host application through
//! the `ActionRegistry`, a closed lookup table that is read-mostly after
//! startup.

use crate::error::ActionError;
use crate::workflow::types::ActionType;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Variables an executor hands back; merged into the execution context
pub type ActionOutput = Map<String, Value>;

/// Per-call metadata handed to an executor
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub execution_id: Uuid,
    pub incident_id: String,
    pub action_id: String,
    pub action_type: ActionType,
    /// 1-based attempt number
    pub attempt: u32,
    /// Deadline the engine enforces for this call
    pub timeout: Duration,
    /// Cancelled on timeout or when the execution is cancelled
    pub cancellation: CancellationToken,
}

impl ActionContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// A concrete remediation capability (isolate a host, block an IP, ...)
///
/// Implementations must honor `ctx.cancellation` and classify failures as
/// `ActionError::Retryable` or `ActionError::NonRetryable`.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        ctx: &ActionContext,
        parameters: Map<String, Value>,
        exec_context: &Map<String, Value>,
    ) -> Result<ActionOutput, ActionError>;
}

/// Lock-free action type → executor table
#[derive(Default)]
pub struct ActionRegistry {
    executors: ArcSwap<HashMap<ActionType, Arc<dyn ActionExecutor>>>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&'static str> = self.executors.load().keys().map(ActionType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("ActionRegistry").field("action_types", &types).finish()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration for startup wiring
    pub fn with(self, action_type: ActionType, executor: Arc<dyn ActionExecutor>) -> Self {
        self.register(action_type, executor);
        self
    }

    /// Register or replace the executor for an action type
    pub fn register(&self, action_type: ActionType, executor: Arc<dyn ActionExecutor>) {
        self.executors.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(action_type, Arc::clone(&executor));
            next
        });
        tracing::debug!("🔌 Registered executor for {}", action_type);
    }

    pub fn get(&self, action_type: ActionType) -> Option<Arc<dyn ActionExecutor>> {
        self.executors.load().get(&action_type).cloned()
    }
}

/// Executor that performs no side effect and reports what it would have done
///
/// Registered for every action type by the standalone server so playbooks can
/// be rehearsed end to end before real integrations are wired in.
#[derive(Debug, Default)]
pub struct DryRunExecutor;

impl DryRunExecutor {
    pub const ALL_TYPES: [ActionType; 12] = [
        ActionType::IsolateAsset,
        ActionType::BlockIp,
        ActionType::BlockDomain,
        ActionType::DisableAccount,
        ActionType::ResetPassword,
        ActionType::CollectLogs,
        ActionType::SnapshotSystem,
        ActionType::SendNotification,
        ActionType::CreateTicket,
        ActionType::Escalate,
        ActionType::RunScript,
        ActionType::Custom,
    ];

    /// Registry with the dry-run executor behind every action type
    pub fn registry() -> ActionRegistry {
        let executor: Arc<dyn ActionExecutor> = Arc::new(DryRunExecutor);
        Self::ALL_TYPES
            .into_iter()
            .fold(ActionRegistry::new(), |registry, action_type| registry.with(action_type, Arc::clone(&executor)))
    }
}

#[async_trait]
impl ActionExecutor for DryRunExecutor {
    async fn execute(
        &self,
        ctx: &ActionContext,
        parameters: Map<String, Value>,
        _exec_context: &Map<String, Value>,
    ) -> Result<ActionOutput, ActionError> {
        if ctx.is_cancelled() {
            return Err(ActionError::Cancelled);
        }

        let rendered = serde_json::to_string(&parameters).unwrap_or_default();
        tracing::info!("🧪 [dry-run] {} '{}' for incident {} with {}",
            ctx.action_type, ctx.action_id, ctx.incident_id, rendered);

        let mut output = Map::new();
        output.insert(
            format!("{}_dry_run", ctx.action_type),
            json!({ "parameters": parameters, "attempt": ctx.attempt }),
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ActionExecutor for Echo {
        async fn execute(
            &self,
            _ctx: &ActionContext,
            parameters: Map<String, Value>,
            _exec_context: &Map<String, Value>,
        ) -> Result<ActionOutput, ActionError> {
            Ok(parameters)
        }
    }

    fn ctx(action_type: ActionType) -> ActionContext {
        ActionContext {
            execution_id: Uuid::new_v4(),
            incident_id: "inc-1".into(),
            action_id: "a1".into(),
            action_type,
            attempt: 1,
            timeout: Duration::from_secs(5),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn registry_dispatches_by_action_type() {
        let registry = ActionRegistry::new().with(ActionType::BlockIp, Arc::new(Echo));
        assert!(registry.get(ActionType::BlockIp).is_some());
        assert!(registry.get(ActionType::IsolateAsset).is_none());

        let executor = registry.get(ActionType::BlockIp).unwrap();
        let params = json!({ "ip": "203.0.113.9" }).as_object().cloned().unwrap();
        let output = executor.execute(&ctx(ActionType::BlockIp), params.clone(), &Map::new()).await.unwrap();
        assert_eq!(output, params);
    }

    #[tokio::test]
    async fn re_registering_replaces_executor() {
        let registry = DryRunExecutor::registry();
        registry.register(ActionType::BlockIp, Arc::new(Echo));

        let params = json!({ "ip": "198.51.100.1" }).as_object().cloned().unwrap();
        let output = registry.get(ActionType::BlockIp).unwrap()
            .execute(&ctx(ActionType::BlockIp), params.clone(), &Map::new())
            .await
            .unwrap();
        assert_eq!(output, params);
    }

    #[tokio::test]
    async fn dry_run_covers_every_action_type() {
        let registry = DryRunExecutor::registry();
        for action_type in DryRunExecutor::ALL_TYPES {
            assert!(registry.get(action_type).is_some(), "{} missing", action_type);
        }
        let output = registry.get(ActionType::CreateTicket).unwrap()
            .execute(&ctx(ActionType::CreateTicket), Map::new(), &Map::new())
            .await
            .unwrap();
        assert!(output.contains_key("create_ticket_dry_run"));
    }

    #[tokio::test]
    async fn dry_run_logs_parameters_and_honors_cancellation() {
        let executor = DryRunExecutor;
        let params = json!({ "host": "web-01", "ports": [22, 443] }).as_object().cloned().unwrap();
        let output = executor.execute(&ctx(ActionType::IsolateAsset), params.clone(), &Map::new()).await.unwrap();
        assert_eq!(output["isolate_asset_dry_run"]["parameters"], Value::Object(params.clone()));

        let cancelled = ctx(ActionType::IsolateAsset);
        cancelled.cancellation.cancel();
        let err = executor.execute(&cancelled, params, &Map::new()).await.unwrap_err();
        assert_eq!(err, ActionError::Cancelled);
    }
}
