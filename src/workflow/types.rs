//! Core workflow type definitions
//!
//! Playbook definitions (`WorkflowDefinition`, `WorkflowAction`) are immutable
//! once published. `WorkflowExecution` is the single mutable record of one
//! run of a definition against one incident. Everything here is serialized to
//! JSON for persistence and for the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Branch target value that ends the walk, equivalent to `null`.
pub const END_SENTINEL: &str = "end";

/// Fixed incident taxonomy a playbook is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowCategory {
    Malware,
    Phishing,
    DataBreach,
    Ddos,
    UnauthorizedAccess,
    InsiderThreat,
    Ransomware,
    Generic,
}

impl Default for WorkflowCategory {
    fn default() -> Self {
        WorkflowCategory::Generic
    }
}

/// When a playbook should start on its own for a new incident.
///
/// Empty sets match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerConditions {
    #[serde(default)]
    pub severity: Vec<String>,
    #[serde(default)]
    pub category: Vec<String>,
    #[serde(default)]
    pub priority: Vec<String>,
    #[serde(default)]
    pub auto_trigger: bool,
}

impl TriggerConditions {
    pub fn matches(&self, severity: Option<&str>, category: Option<&str>, priority: Option<&str>) -> bool {
        fn allowed(set: &[String], value: Option<&str>) -> bool {
            set.is_empty() || value.is_some_and(|v| set.iter().any(|s| s.eq_ignore_ascii_case(v)))
        }
        allowed(&self.severity, severity)
            && allowed(&self.category, category)
            && allowed(&self.priority, priority)
    }
}

/// A published, versioned playbook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Stable identifier shared by every version (e.g., "pb-ransomware")
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: WorkflowCategory,
    #[serde(default)]
    pub trigger_conditions: TriggerConditions,
    /// Ordered actions; branching may reroute the order
    pub actions: Vec<WorkflowAction>,
    /// Allow independent sibling branches to run concurrently
    #[serde(default)]
    pub parallel_execution: bool,
    /// Assigned by the registry on publish
    #[serde(default)]
    pub version: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl WorkflowDefinition {
    pub fn action(&self, action_id: &str) -> Option<&WorkflowAction> {
        self.actions.iter().find(|a| a.action_id == action_id)
    }
}

/// Remediation capability requested by an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    IsolateAsset,
    BlockIp,
    BlockDomain,
    DisableAccount,
    ResetPassword,
    CollectLogs,
    SnapshotSystem,
    SendNotification,
    CreateTicket,
    Escalate,
    RunScript,
    Custom,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::IsolateAsset => "isolate_asset",
            ActionType::BlockIp => "block_ip",
            ActionType::BlockDomain => "block_domain",
            ActionType::DisableAccount => "disable_account",
            ActionType::ResetPassword => "reset_password",
            ActionType::CollectLogs => "collect_logs",
            ActionType::SnapshotSystem => "snapshot_system",
            ActionType::SendNotification => "send_notification",
            ActionType::CreateTicket => "create_ticket",
            ActionType::Escalate => "escalate",
            ActionType::RunScript => "run_script",
            ActionType::Custom => "custom",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Branching attached to an action.
///
/// `on_true` / `on_false` name an action id, or end the walk when `None` or
/// `"end"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalLogic {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub condition: String,
    #[serde(default)]
    pub on_true: Option<String>,
    #[serde(default)]
    pub on_false: Option<String>,
}

/// Normalize a branch target: `None` and the end sentinel both end the walk.
pub fn branch_target(target: &Option<String>) -> Option<&str> {
    match target.as_deref() {
        None | Some(END_SENTINEL) => None,
        Some(id) => Some(id),
    }
}

/// A node in the definition graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowAction {
    pub action_id: String,
    #[serde(default)]
    pub name: String,
    pub order: u32,
    pub action_type: ActionType,
    /// Opaque parameters handed to the executor after `{{var}}` rendering
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub conditional_logic: Option<ConditionalLogic>,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(default)]
    pub approval_role: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub retry_on_failure: bool,
    #[serde(default)]
    pub max_retries: u32,
    /// Explicit entry marker, overrides `order == 1`
    #[serde(default)]
    pub start: bool,
    /// Explicit successors, overrides the order-derived default
    #[serde(default)]
    pub next: Vec<String>,
}

impl WorkflowAction {
    /// Branching only counts when present and enabled
    pub fn branching(&self) -> Option<&ConditionalLogic> {
        self.conditional_logic.as_ref().filter(|logic| logic.enabled)
    }
}

/// Lifecycle of a `WorkflowExecution`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    WaitingApproval,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::WaitingApproval => "waiting_approval",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    /// Allowed edges: pending → running → {waiting_approval ⇄ running} → terminal.
    /// Cancellation and failure are reachable from every non-terminal state.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        match (self, next) {
            (Pending, Running) => true,
            (Running, WaitingApproval) | (WaitingApproval, Running) => true,
            (Running, Completed) => true,
            (s, Failed) | (s, Cancelled) => !s.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => ExecutionStatus::Pending,
            "running" => ExecutionStatus::Running,
            "waiting_approval" => ExecutionStatus::WaitingApproval,
            "completed" => ExecutionStatus::Completed,
            "failed" => ExecutionStatus::Failed,
            "cancelled" => ExecutionStatus::Cancelled,
            other => return Err(anyhow::anyhow!("Unknown execution status: {}", other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Success,
    Failure,
    Timeout,
}

/// One attempt of one action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_id: String,
    /// 1-based attempt number for this action
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: ActionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Condition result taken at this node, kept so a replay follows the same edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<bool>,
    /// Executor output of a successful attempt, re-applied when the walk is replayed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Map<String, Value>>,
}

/// Decision taken at an approval gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub action_id: String,
    pub approved: bool,
    pub approver: String,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ActionFailed,
    ActionTimedOut,
    ApprovalDenied,
    Internal,
}

/// Why an execution ended in `failed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    pub message: String,
}

/// One run of a definition against one incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: String,
    pub workflow_version: u32,
    pub incident_id: String,
    pub status: ExecutionStatus,
    pub current_action_id: Option<String>,
    /// Variables produced by completed actions; keys are only added or overwritten
    pub context: Map<String, Value>,
    /// Append-only attempt log
    pub action_results: Vec<ActionResult>,
    #[serde(default)]
    pub approvals: Vec<ApprovalRecord>,
    #[serde(default)]
    pub failure: Option<ExecutionFailure>,
    #[serde(default)]
    pub cancel_reason: Option<String>,
    pub triggered_by: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Last timeline sequence number handed out for this execution
    #[serde(default)]
    pub event_seq: u64,
    #[serde(default)]
    pub sla_breach_recorded: bool,
    /// Writes merged at each completed fork, keyed by the fork's action id
    #[serde(default)]
    pub merged_forks: HashMap<String, Map<String, Value>>,
}

impl WorkflowExecution {
    pub fn new(definition: &WorkflowDefinition, incident_id: &str, triggered_by: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: definition.id.clone(),
            workflow_version: definition.version,
            incident_id: incident_id.to_string(),
            status: ExecutionStatus::Pending,
            current_action_id: None,
            context: Map::new(),
            action_results: Vec::new(),
            approvals: Vec::new(),
            failure: None,
            cancel_reason: None,
            triggered_by: triggered_by.to_string(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            event_seq: 0,
            sla_breach_recorded: false,
            merged_forks: HashMap::new(),
        }
    }

    /// Move to `next` if the state machine allows it.
    ///
    /// Returns false and leaves the record untouched for illegal edges, which
    /// is how late writers lose against an earlier terminal transition.
    pub fn transition(&mut self, next: ExecutionStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        let now = Utc::now();
        if next == ExecutionStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = next;
        true
    }

    pub fn next_sequence(&mut self) -> u64 {
        self.event_seq += 1;
        self.event_seq
    }

    pub fn attempts_for(&self, action_id: &str) -> u32 {
        self.action_results
            .iter()
            .filter(|r| r.action_id == action_id)
            .count() as u32
    }

    /// The successful attempt of an action, if any
    pub fn success_of(&self, action_id: &str) -> Option<&ActionResult> {
        self.action_results
            .iter()
            .find(|r| r.action_id == action_id && r.outcome == ActionOutcome::Success)
    }

    pub fn approval_granted(&self, action_id: &str) -> bool {
        self.approvals
            .iter()
            .any(|a| a.action_id == action_id && a.approved)
    }

    /// Wall-clock duration of a finished execution
    pub fn duration_ms(&self) -> Option<i64> {
        let start = self.started_at.unwrap_or(self.created_at);
        self.completed_at.map(|end| (end - start).num_milliseconds().max(0))
    }
}

/// Read-only view returned by `status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub id: Uuid,
    pub workflow_id: String,
    pub workflow_version: u32,
    pub incident_id: String,
    pub status: ExecutionStatus,
    pub current_action_id: Option<String>,
    pub action_results: Vec<ActionResult>,
    pub context: Map<String, Value>,
    pub failure: Option<ExecutionFailure>,
    pub cancel_reason: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&WorkflowExecution> for ExecutionSnapshot {
    fn from(exec: &WorkflowExecution) -> Self {
        Self {
            id: exec.id,
            workflow_id: exec.workflow_id.clone(),
            workflow_version: exec.workflow_version,
            incident_id: exec.incident_id.clone(),
            status: exec.status,
            current_action_id: exec.current_action_id.clone(),
            action_results: exec.action_results.clone(),
            context: exec.context.clone(),
            failure: exec.failure.clone(),
            cancel_reason: exec.cancel_reason.clone(),
            started_at: exec.started_at,
            completed_at: exec.completed_at,
        }
    }
}

/// Derived per-workflow automation counters, updated on terminal transitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutomationStats {
    pub workflow_id: String,
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub average_execution_ms: f64,
}

impl AutomationStats {
    /// Fold one terminal execution into the running averages
    pub fn record(&mut self, status: ExecutionStatus, duration_ms: i64) {
        let previous = self.execution_count as f64;
        self.execution_count += 1;
        match status {
            ExecutionStatus::Completed => self.success_count += 1,
            ExecutionStatus::Failed => self.failure_count += 1,
            _ => {}
        }
        self.average_execution_ms =
            (self.average_execution_ms * previous + duration_ms as f64) / self.execution_count as f64;
    }
}
