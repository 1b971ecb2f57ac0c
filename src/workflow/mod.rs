/// Workflow Management Layer
///
/// Playbook definitions, their compilation into validated graphs, SQLite
/// persistence of published versions, and the hot-reload registry.

// Core type definitions
pub mod types;

// Graph validation and successor tables
pub mod graph;

// SQLite persistence of published versions
pub mod storage;

// Hot-reload registry using ArcSwap
pub mod registry;

pub use graph::CompiledWorkflow;
pub use registry::WorkflowRegistry;
pub use types::{
    ActionType, ExecutionSnapshot, ExecutionStatus, WorkflowAction, WorkflowDefinition, WorkflowExecution,
};
