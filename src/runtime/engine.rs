/// Execution state machine
///
/// Walks a `CompiledWorkflow` for one `WorkflowExecution`: evaluates branch
/// conditions, parks at approval gates, dispatches actions through the
/// `ActionRegistry` under the retry/timeout policy, fans out parallel
/// branches and joins them, and records every transition on the timeline.
///
/// The walk always starts at the entry action. Actions that already have a
/// successful result are replayed from the record instead of executed, so
/// resuming after an approval and recovering after a restart take the same
/// path as a fresh start.

use crate::error::{ActionError, EngineError};
use crate::incident::{Incident, IncidentGateway};
use crate::runtime::executor::{ActionContext, ActionOutput, ActionRegistry};
use crate::runtime::policy::RetryPolicy;
use crate::runtime::scope::Scope;
use crate::runtime::timeline::{TimelineEvent, TimelineEventType, TimelineRecorder};
use crate::store::ExecutionStore;
use crate::workflow::graph::{CompiledWorkflow, ForkPlan, Successors};
use crate::workflow::types::{
    ActionOutcome, ActionResult, ExecutionFailure, ExecutionSnapshot, ExecutionStatus, FailureKind,
    WorkflowAction, WorkflowExecution,
};
use arc_swap::ArcSwap;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Live execution: authoritative state behind a mutex plus a lock-free snapshot
///
/// The state lock is never held across an executor call or a backoff sleep,
/// so `cancel` and `status` are never stuck behind a slow action.
#[derive(Debug)]
pub struct ExecutionHandle {
    pub id: Uuid,
    pub incident_id: String,
    pub workflow: Arc<CompiledWorkflow>,
    state: Mutex<WorkflowExecution>,
    snapshot: ArcSwap<ExecutionSnapshot>,
    /// Parent of every per-action token
    cancel: CancellationToken,
}

impl ExecutionHandle {
    pub fn new(workflow: Arc<CompiledWorkflow>, execution: WorkflowExecution) -> Self {
        Self {
            id: execution.id,
            incident_id: execution.incident_id.clone(),
            workflow,
            snapshot: ArcSwap::from_pointee(ExecutionSnapshot::from(&execution)),
            state: Mutex::new(execution),
            cancel: CancellationToken::new(),
        }
    }

    /// Latest published snapshot; never waits on the state lock
    pub fn snapshot(&self) -> Arc<ExecutionSnapshot> {
        self.snapshot.load_full()
    }

    pub async fn lock(&self) -> MutexGuard<'_, WorkflowExecution> {
        self.state.lock().await
    }

    pub fn publish(&self, execution: &WorkflowExecution) {
        self.snapshot.store(Arc::new(ExecutionSnapshot::from(execution)));
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// How an execution reaches a terminal state
#[derive(Debug, Clone)]
pub enum Terminal {
    Completed,
    Failed(ExecutionFailure),
    Cancelled(String),
}

/// Result of entering one action
enum Visit {
    Done { branch: Option<bool> },
    /// Parked at an approval gate
    Suspended,
    /// The execution failed or was cancelled; stop walking
    Halted,
}

/// Result of walking a path until its end or its stop set
enum Flow {
    /// Path finished; carries the lane's writes for branch lanes
    Reached(Option<Map<String, Value>>),
    Suspended,
    Halted,
}

type WalkFuture = Pin<Box<dyn Future<Output = Result<Flow, EngineError>> + Send>>;

/// One path of the walk
///
/// The main walk writes straight into the execution context. A parallel
/// branch collects its writes in `overlay` until the join merges them, and
/// sees the writes of enclosing branches through `inherited`.
#[derive(Clone)]
struct Lane {
    inherited: Arc<Map<String, Value>>,
    overlay: Option<Map<String, Value>>,
    token: CancellationToken,
    stop: Arc<HashSet<String>>,
}

impl Lane {
    fn main(token: CancellationToken) -> Self {
        Self {
            inherited: Arc::new(Map::new()),
            overlay: None,
            token,
            stop: Arc::new(HashSet::new()),
        }
    }

    /// Variables visible to this lane: shared context, then enclosing and own writes
    fn variables(&self, context: &Map<String, Value>) -> Map<String, Value> {
        let mut variables = context.clone();
        variables.extend(self.inherited.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(overlay) = &self.overlay {
            variables.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        variables
    }
}

/// Output keys land at the top level and the whole object under the action id
fn apply_output(target: &mut Map<String, Value>, action_id: &str, output: &ActionOutput) {
    for (key, value) in output {
        target.insert(key.clone(), value.clone());
    }
    target.insert(action_id.to_string(), Value::Object(output.clone()));
}

#[derive(Clone)]
pub struct ExecutionStateMachine {
    actions: Arc<ActionRegistry>,
    incidents: Arc<dyn IncidentGateway>,
    store: Arc<dyn ExecutionStore>,
    timeline: TimelineRecorder,
    policy: RetryPolicy,
}

impl ExecutionStateMachine {
    pub fn new(
        actions: Arc<ActionRegistry>,
        incidents: Arc<dyn IncidentGateway>,
        store: Arc<dyn ExecutionStore>,
        timeline: TimelineRecorder,
        policy: RetryPolicy,
    ) -> Self {
        Self { actions, incidents, store, timeline, policy }
    }

    /// Drive a running execution until it suspends or terminates
    pub async fn run(&self, handle: Arc<ExecutionHandle>) -> Result<(), EngineError> {
        let incident = match self.incidents.get_incident_snapshot(&handle.incident_id).await? {
            Some(incident) => Arc::new(incident),
            None => {
                tracing::error!("❌ Incident {} vanished under execution {}", handle.incident_id, handle.id);
                let mut exec = handle.lock().await;
                let failure = ExecutionFailure {
                    kind: FailureKind::Internal,
                    action_id: exec.current_action_id.clone(),
                    message: format!("incident {} is no longer available", handle.incident_id),
                };
                self.finish(&handle, &mut exec, Terminal::Failed(failure)).await?;
                return Ok(());
            }
        };

        let entry = handle.workflow.entry().to_string();
        tracing::info!("🚀 Driving execution {} of '{}' v{} from '{}'",
            handle.id, handle.workflow.definition.id, handle.workflow.definition.version, entry);

        let started = std::time::Instant::now();
        let lane = Lane::main(handle.cancel.clone());
        let flow = match self.walk(Arc::clone(&handle), incident, entry, lane).await {
            Ok(flow) => flow,
            Err(e) => {
                tracing::error!("💥 Execution {} aborted: {}", handle.id, e);
                let mut exec = handle.lock().await;
                let failure = ExecutionFailure {
                    kind: FailureKind::Internal,
                    action_id: exec.current_action_id.clone(),
                    message: e.to_string(),
                };
                if let Err(inner) = self.finish(&handle, &mut exec, Terminal::Failed(failure)).await {
                    tracing::error!("❌ Could not record failure of execution {}: {}", handle.id, inner);
                }
                return Err(e);
            }
        };

        match flow {
            Flow::Reached(_) => {
                let mut exec = handle.lock().await;
                if self.finish(&handle, &mut exec, Terminal::Completed).await? {
                    tracing::info!("🎉 Execution {} completed in {:?}", handle.id, started.elapsed());
                }
            }
            Flow::Suspended => tracing::info!("⏸️ Execution {} suspended after {:?}", handle.id, started.elapsed()),
            Flow::Halted => tracing::info!("⏹️ Execution {} halted after {:?}", handle.id, started.elapsed()),
        }
        Ok(())
    }

    /// Move an execution into a terminal state
    ///
    /// Persists the record, publishes the snapshot, records the event durably,
    /// folds the run into the workflow statistics and signals every in-flight
    /// action. Returns false when the execution was already terminal.
    pub async fn finish(
        &self,
        handle: &ExecutionHandle,
        exec: &mut WorkflowExecution,
        terminal: Terminal,
    ) -> Result<bool, EngineError> {
        let (status, event_type) = match &terminal {
            Terminal::Completed => (ExecutionStatus::Completed, TimelineEventType::ExecutionCompleted),
            Terminal::Failed(_) => (ExecutionStatus::Failed, TimelineEventType::ExecutionFailed),
            Terminal::Cancelled(_) => (ExecutionStatus::Cancelled, TimelineEventType::ExecutionCancelled),
        };
        if !exec.transition(status) {
            tracing::debug!("⏭️ Execution {} already {}, ignoring {}", exec.id, exec.status, status);
            return Ok(false);
        }

        let event = match terminal {
            Terminal::Completed => {
                exec.current_action_id = None;
                let description = format!("Playbook completed after {} action attempts", exec.action_results.len());
                TimelineEvent::new(exec, event_type, description)
            }
            Terminal::Failed(failure) => {
                let mut event = TimelineEvent::new(exec, event_type, failure.message.clone())
                    .with_meta("failure_kind", serde_json::to_value(failure.kind).unwrap_or(Value::Null));
                if let Some(action_id) = &failure.action_id {
                    event = event.with_action(action_id.clone());
                }
                exec.failure = Some(failure);
                event
            }
            Terminal::Cancelled(reason) => {
                let event = TimelineEvent::new(exec, event_type, format!("Cancelled: {}", reason));
                exec.cancel_reason = Some(reason);
                event
            }
        };

        self.store.save(exec).await?;
        handle.publish(exec);
        self.timeline.record(event).await?;
        handle.cancel.cancel();

        if let Some(duration_ms) = exec.duration_ms() {
            if let Err(e) = self.store.record_terminal(&exec.workflow_id, status, duration_ms).await {
                tracing::warn!("⚠️ Stats update for '{}' failed: {}", exec.workflow_id, e);
            }
        }

        tracing::info!("🏁 Execution {} is now {}", exec.id, status);
        Ok(true)
    }

    fn walk(&self, handle: Arc<ExecutionHandle>, incident: Arc<Incident>, start: String, mut lane: Lane) -> WalkFuture {
        let engine = self.clone();
        Box::pin(async move {
            let workflow = Arc::clone(&handle.workflow);
            let mut cursor = Some(start);

            while let Some(action_id) = cursor.take() {
                if lane.stop.contains(&action_id) {
                    break;
                }
                let action = workflow.action(&action_id).ok_or_else(|| {
                    EngineError::InvalidDefinition(format!("walk reached unknown action '{}'", action_id))
                })?;

                let branch = match engine.visit(&handle, &incident, action, &mut lane).await? {
                    Visit::Done { branch } => branch,
                    Visit::Suspended => return Ok(Flow::Suspended),
                    Visit::Halted => return Ok(Flow::Halted),
                };

                cursor = match workflow.successors(&action_id) {
                    Successors::End => None,
                    Successors::Single(next) => Some(next.clone()),
                    Successors::Branch { on_true, on_false } => {
                        if branch.unwrap_or(false) { on_true.clone() } else { on_false.clone() }
                    }
                    Successors::Fork(_) => {
                        let plan = workflow.fork(&action_id).ok_or_else(|| {
                            EngineError::InvalidDefinition(format!("fork '{}' has no join plan", action_id))
                        })?;
                        if !engine.fork(&handle, &incident, &action_id, plan, &mut lane).await? {
                            return Ok(Flow::Halted);
                        }
                        plan.join.clone()
                    }
                };
            }

            Ok(Flow::Reached(lane.overlay))
        })
    }

    /// Run every branch of a fork concurrently and merge their writes at the join
    ///
    /// Writes merge in completion order; a key written with different values
    /// by two branches keeps the later one and is reported as a conflict.
    /// A fork already merged by an earlier pass re-applies its recorded writes
    /// instead of running its branches again.
    async fn fork(
        &self,
        handle: &Arc<ExecutionHandle>,
        incident: &Arc<Incident>,
        fork_id: &str,
        plan: &ForkPlan,
        lane: &mut Lane,
    ) -> Result<bool, EngineError> {
        {
            let mut exec = handle.lock().await;
            if exec.status != ExecutionStatus::Running || lane.token.is_cancelled() {
                return Ok(false);
            }
            if let Some(merged) = exec.merged_forks.get(fork_id).cloned() {
                tracing::debug!("⏭️ Replaying merged writes of fork '{}'", fork_id);
                match lane.overlay.as_mut() {
                    Some(overlay) => overlay.extend(merged),
                    None => exec.context.extend(merged),
                }
                return Ok(true);
            }
        }

        tracing::info!("🔀 Fork at '{}' into {:?} (join: {:?})", fork_id, plan.branches, plan.join);

        let fork_token = lane.token.child_token();
        let stop = Arc::new(plan.boundary.clone());
        let mut inherited = (*lane.inherited).clone();
        if let Some(overlay) = &lane.overlay {
            inherited.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let inherited = Arc::new(inherited);

        let mut branches = JoinSet::new();
        for start in &plan.branches {
            let child = Lane {
                inherited: Arc::clone(&inherited),
                overlay: Some(Map::new()),
                token: fork_token.clone(),
                stop: Arc::clone(&stop),
            };
            let walk = self.walk(Arc::clone(handle), Arc::clone(incident), start.clone(), child);
            let start = start.clone();
            branches.spawn(async move { (start, walk.await) });
        }

        let mut merged = Map::new();
        let mut writers: HashMap<String, String> = HashMap::new();
        let mut conflicts: Vec<(String, String, String)> = Vec::new();
        let mut halted = false;
        let mut first_error = None;

        while let Some(joined) = branches.join_next().await {
            match joined {
                Ok((branch, Ok(Flow::Reached(overlay)))) => {
                    tracing::debug!("🔁 Branch '{}' of fork '{}' reached the join", branch, fork_id);
                    for (key, value) in overlay.unwrap_or_default() {
                        if merged.get(&key).is_some_and(|previous| previous != &value) {
                            let earlier = writers.get(&key).cloned().unwrap_or_default();
                            conflicts.push((key.clone(), earlier, branch.clone()));
                        }
                        writers.insert(key.clone(), branch.clone());
                        merged.insert(key, value);
                    }
                }
                Ok((branch, Ok(_))) => {
                    tracing::warn!("⏹️ Branch '{}' of fork '{}' halted", branch, fork_id);
                    halted = true;
                    fork_token.cancel();
                }
                Ok((branch, Err(e))) => {
                    tracing::error!("❌ Branch '{}' of fork '{}' errored: {}", branch, fork_id, e);
                    fork_token.cancel();
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    tracing::error!("💥 Branch task of fork '{}' aborted: {}", fork_id, e);
                    fork_token.cancel();
                    first_error.get_or_insert(EngineError::Storage(anyhow::anyhow!("parallel branch aborted: {}", e)));
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if halted {
            return Ok(false);
        }

        let mut exec = handle.lock().await;
        if exec.status != ExecutionStatus::Running {
            return Ok(false);
        }
        for (key, earlier, later) in conflicts {
            let event = TimelineEvent::new(
                &mut exec,
                TimelineEventType::ContextConflict,
                format!("Branches '{}' and '{}' both wrote '{}'; kept the value from '{}'", earlier, later, key, later),
            )
            .with_action(fork_id)
            .with_meta("key", key)
            .with_meta("overwritten_by", later);
            self.timeline.notify(event);
        }
        exec.merged_forks.insert(fork_id.to_string(), merged.clone());
        match lane.overlay.as_mut() {
            Some(overlay) => overlay.extend(merged),
            None => exec.context.extend(merged),
        }
        self.store.save(&exec).await?;
        handle.publish(&exec);
        Ok(true)
    }

    /// Enter one action: replay, gate, or execute with retries
    async fn visit(
        &self,
        handle: &ExecutionHandle,
        incident: &Incident,
        action: &WorkflowAction,
        lane: &mut Lane,
    ) -> Result<Visit, EngineError> {
        let action_id = action.action_id.as_str();

        let (branch, rendered, exec_context, mut attempt) = {
            let mut exec = handle.lock().await;
            if exec.status != ExecutionStatus::Running || lane.token.is_cancelled() {
                return Ok(Visit::Halted);
            }

            if let Some(done) = exec.success_of(action_id).cloned() {
                tracing::debug!("⏭️ Replaying '{}' from its recorded result", action_id);
                if let Some(output) = &done.output {
                    match lane.overlay.as_mut() {
                        Some(overlay) => apply_output(overlay, action_id, output),
                        None => apply_output(&mut exec.context, action_id, output),
                    }
                }
                return Ok(Visit::Done { branch: done.branch });
            }

            let variables = lane.variables(&exec.context);
            let scope = Scope::new(&variables, incident);
            let condition = handle.workflow.condition(action_id);
            let branch = action.branching().map(|_| condition.is_some_and(|c| c.evaluate(&scope)));
            let rendered = scope.render(&action.parameters);

            if action.approval_required && !exec.approval_granted(action_id) {
                exec.current_action_id = Some(action_id.to_string());
                exec.transition(ExecutionStatus::WaitingApproval);
                let mut event = TimelineEvent::new(
                    &mut exec,
                    TimelineEventType::ApprovalRequested,
                    format!("Approval required before '{}' ({})", action_id, action.action_type),
                )
                .with_action(action_id);
                if let Some(role) = &action.approval_role {
                    event = event.with_meta("approval_role", role.clone());
                }
                self.store.save(&exec).await?;
                handle.publish(&exec);
                self.timeline.record(event).await?;
                tracing::info!("✋ Execution {} waiting for approval of '{}'", exec.id, action_id);
                return Ok(Visit::Suspended);
            }

            exec.current_action_id = Some(action_id.to_string());
            handle.publish(&exec);
            let attempt = exec.attempts_for(action_id) + 1;
            (branch, rendered, variables, attempt)
        };

        let timeout = self.policy.timeout_for(action);

        loop {
            {
                let mut exec = handle.lock().await;
                if exec.status != ExecutionStatus::Running || lane.token.is_cancelled() {
                    return Ok(Visit::Halted);
                }
                let event = TimelineEvent::new(
                    &mut exec,
                    TimelineEventType::ActionStarted,
                    format!("Started '{}' ({}), attempt {}", action_id, action.action_type, attempt),
                )
                .with_action(action_id)
                .with_meta("attempt", attempt)
                .with_meta("action_type", action.action_type.as_str());
                self.timeline.notify(event);
            }

            tracing::info!("▶️ [{}] '{}' ({}) attempt {}", handle.id, action_id, action.action_type, attempt);
            let started_at = Utc::now();
            let outcome = match &rendered {
                Ok(parameters) => {
                    self.invoke(handle, action, attempt, timeout, parameters.clone(), &exec_context, &lane.token).await
                }
                Err(e) => Err(e.clone()),
            };
            let finished_at = Utc::now();

            let mut exec = handle.lock().await;
            if exec.status != ExecutionStatus::Running {
                let event = TimelineEvent::new(
                    &mut exec,
                    TimelineEventType::ActionResultDiscarded,
                    format!("Result of '{}' attempt {} arrived after the execution ended", action_id, attempt),
                )
                .with_action(action_id)
                .with_meta("status", exec.status.as_str())
                .with_meta("succeeded", outcome.is_ok());
                self.timeline.notify(event);
                self.store.save(&exec).await?;
                tracing::warn!("🗑️ Discarded late result of '{}' for {} execution {}", action_id, exec.status, exec.id);
                return Ok(Visit::Halted);
            }

            match outcome {
                Ok(output) => {
                    exec.action_results.push(ActionResult {
                        action_id: action_id.to_string(),
                        attempt,
                        started_at,
                        finished_at,
                        outcome: ActionOutcome::Success,
                        error: None,
                        branch,
                        output: Some(output.clone()),
                    });
                    match lane.overlay.as_mut() {
                        Some(overlay) => apply_output(overlay, action_id, &output),
                        None => apply_output(&mut exec.context, action_id, &output),
                    }

                    let keys: Vec<Value> = output.keys().cloned().map(Value::String).collect();
                    let event = TimelineEvent::new(
                        &mut exec,
                        TimelineEventType::ActionSucceeded,
                        format!("'{}' succeeded on attempt {}", action_id, attempt),
                    )
                    .with_action(action_id)
                    .with_meta("attempt", attempt)
                    .with_meta("output_keys", Value::Array(keys));
                    self.timeline.notify(event);

                    if let (Some(taken), Some(logic)) = (branch, action.branching()) {
                        let target = if taken { &logic.on_true } else { &logic.on_false };
                        let source = handle.workflow.condition(action_id).map_or("", |c| c.source());
                        let event = TimelineEvent::new(
                            &mut exec,
                            TimelineEventType::BranchTaken,
                            format!("Condition '{}' was {} at '{}'", source, taken, action_id),
                        )
                        .with_action(action_id)
                        .with_meta("result", taken)
                        .with_meta("target", target.clone().map(Value::String).unwrap_or(Value::Null));
                        self.timeline.notify(event);
                        tracing::info!("🔀 '{}' condition was {}", action_id, taken);
                    }

                    self.store.save(&exec).await?;
                    handle.publish(&exec);
                    tracing::info!("✅ '{}' succeeded on attempt {}", action_id, attempt);
                    return Ok(Visit::Done { branch });
                }
                Err(error) => {
                    let timed_out = error.is_timeout();
                    exec.action_results.push(ActionResult {
                        action_id: action_id.to_string(),
                        attempt,
                        started_at,
                        finished_at,
                        outcome: if timed_out { ActionOutcome::Timeout } else { ActionOutcome::Failure },
                        error: Some(error.to_string()),
                        branch: None,
                        output: None,
                    });
                    let event = TimelineEvent::new(
                        &mut exec,
                        if timed_out { TimelineEventType::ActionTimedOut } else { TimelineEventType::ActionFailed },
                        format!("'{}' attempt {}: {}", action_id, attempt, error),
                    )
                    .with_action(action_id)
                    .with_meta("attempt", attempt)
                    .with_meta("error_kind", serde_json::to_value(error.kind()).unwrap_or(Value::Null));
                    self.timeline.notify(event);

                    let decision = self.policy.decide(attempt, action.max_retries, action.retry_on_failure, error.kind());
                    if decision.should_retry {
                        let backoff_ms = decision.backoff.as_millis() as u64;
                        let event = TimelineEvent::new(
                            &mut exec,
                            TimelineEventType::ActionRetryScheduled,
                            format!("Retrying '{}' in {}ms", action_id, backoff_ms),
                        )
                        .with_action(action_id)
                        .with_meta("next_attempt", attempt + 1)
                        .with_meta("backoff_ms", backoff_ms);
                        self.timeline.notify(event);
                        self.store.save(&exec).await?;
                        handle.publish(&exec);
                        drop(exec);

                        tracing::warn!("🔁 '{}' attempt {} failed ({}), retrying in {:?}", action_id, attempt, error, decision.backoff);
                        tokio::select! {
                            _ = tokio::time::sleep(decision.backoff) => {}
                            _ = lane.token.cancelled() => return Ok(Visit::Halted),
                        }
                        attempt += 1;
                        continue;
                    }

                    tracing::error!("❌ '{}' failed after {} attempt(s): {}", action_id, attempt, error);
                    let failure = ExecutionFailure {
                        kind: if timed_out { FailureKind::ActionTimedOut } else { FailureKind::ActionFailed },
                        action_id: Some(action_id.to_string()),
                        message: format!("'{}' failed after {} attempt(s): {}", action_id, attempt, error),
                    };
                    self.finish(handle, &mut exec, Terminal::Failed(failure)).await?;
                    return Ok(Visit::Halted);
                }
            }
        }
    }

    /// One executor call under its deadline
    #[allow(clippy::too_many_arguments)]
    async fn invoke(
        &self,
        handle: &ExecutionHandle,
        action: &WorkflowAction,
        attempt: u32,
        timeout: Duration,
        parameters: Map<String, Value>,
        exec_context: &Map<String, Value>,
        parent: &CancellationToken,
    ) -> Result<ActionOutput, ActionError> {
        let executor = self.actions
            .get(action.action_type)
            .ok_or(ActionError::MissingCapability(action.action_type))?;

        let ctx = ActionContext {
            execution_id: handle.id,
            incident_id: handle.incident_id.clone(),
            action_id: action.action_id.clone(),
            action_type: action.action_type,
            attempt,
            timeout,
            cancellation: parent.child_token(),
        };

        match tokio::time::timeout(timeout, executor.execute(&ctx, parameters, exec_context)).await {
            Ok(result) => result,
            Err(_) => {
                ctx.cancellation.cancel();
                tracing::warn!("⏰ '{}' timed out after {:?}", action.action_id, timeout);
                Err(ActionError::Timeout(timeout.as_secs()))
            }
        }
    }
}
