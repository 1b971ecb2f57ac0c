/// Runtime Execution Engine
///
/// Everything that happens while a playbook runs:
/// - Condition language and variable scope
/// - Action executor capability and registry
/// - Retry/timeout policy
/// - The execution state machine
/// - Timeline recording
/// - The SLA monitor job

// Restricted condition language
pub mod expression;

// Variable resolution and {{var}} rendering
pub mod scope;

// Pure retry and timeout decisions
pub mod policy;

// Action executor trait, registry and dry-run executor
pub mod executor;

// Execution state machine
pub mod engine;

// Ordered audit trail writer
pub mod timeline;

// Background SLA monitor
pub mod scheduler;

pub use engine::{ExecutionHandle, ExecutionStateMachine};
pub use executor::{ActionContext, ActionExecutor, ActionOutput, ActionRegistry, DryRunExecutor};
pub use policy::{RetryDecision, RetryPolicy};
pub use scheduler::SlaMonitorService;
pub use timeline::{TimelineEvent, TimelineEventType, TimelineRecorder};
