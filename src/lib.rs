/// Playbook engine: incident response workflow execution
///
/// Runs versioned response playbooks against incidents with conditional
/// branching, approval gates, retries with timeouts, parallel branches, an
/// ordered audit timeline and SLA tracking.

// Core configuration and setup
pub mod config;

// Error taxonomy
pub mod error;

// Incident boundary consumed by the engine
pub mod incident;

// Workflow management layer - definitions, graph compilation, storage, registry
pub mod workflow;

// Runtime - conditions, actions, policy, state machine, timeline, SLA monitor
pub mod runtime;

// Execution persistence
pub mod store;

// Public engine façade
pub mod orchestrator;

// HTTP API layer
pub mod api;

// Server setup and initialization
pub mod server;

pub use error::{ActionError, EngineError, ErrorKind};
pub use orchestrator::Orchestrator;
pub use server::start_server;
pub use workflow::{WorkflowDefinition, WorkflowExecution};
