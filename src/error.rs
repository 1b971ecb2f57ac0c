//! Error taxonomy for the playbook engine
//!
//! `EngineError` is what callers of the orchestrator see. `ActionError` is
//! what action executors return; it never escapes the state machine, it is
//! recorded in the execution's results and fed to the retry policy.

use crate::workflow::types::{ActionType, ExecutionStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced synchronously by the orchestrator.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The action graph is malformed (dangling branch target, cycle, bad entry).
    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),

    /// The workflow exists but is not active.
    #[error("Workflow is not active: {0}")]
    InactiveWorkflow(String),

    #[error("Workflow not found: {id}")]
    WorkflowNotFound { id: String, version: Option<u32> },

    #[error("Incident not found: {0}")]
    IncidentNotFound(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(Uuid),

    /// The execution already reached a terminal state; the call was a no-op.
    #[error("Execution {id} is already {status}")]
    StaleExecution { id: Uuid, status: ExecutionStatus },

    /// `resume` was called on an execution that is not parked at an approval gate.
    #[error("Execution {id} is not awaiting approval (status: {status})")]
    NotAwaitingApproval { id: Uuid, status: ExecutionStatus },

    /// Persistence or gateway failure.
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Classification used by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Retryable,
    NonRetryable,
}

/// Errors produced while executing a single action.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    /// Transient failure (network blip, remote busy).
    #[error("{0}")]
    Retryable(String),

    /// Permanent failure reported by the executor.
    #[error("{0}")]
    NonRetryable(String),

    /// Parameters could not be rendered or were rejected.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// No executor is registered for the action type.
    #[error("no executor registered for action type '{0}'")]
    MissingCapability(ActionType),

    /// The executor did not return within its deadline.
    #[error("action timed out after {0}s")]
    Timeout(u64),

    /// The execution was cancelled while the action was in flight.
    #[error("action cancelled")]
    Cancelled,
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::Retryable(_) | ActionError::Timeout(_) => ErrorKind::Retryable,
            ActionError::NonRetryable(_)
            | ActionError::InvalidParameters(_)
            | ActionError::MissingCapability(_)
            | ActionError::Cancelled => ErrorKind::NonRetryable,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ActionError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_transient_failures_are_retryable() {
        assert_eq!(ActionError::Timeout(5).kind(), ErrorKind::Retryable);
        assert_eq!(ActionError::Retryable("503".into()).kind(), ErrorKind::Retryable);
    }

    #[test]
    fn malformed_input_is_never_retried() {
        assert_eq!(
            ActionError::InvalidParameters("missing host".into()).kind(),
            ErrorKind::NonRetryable
        );
        assert_eq!(
            ActionError::MissingCapability(ActionType::RunScript).kind(),
            ErrorKind::NonRetryable
        );
    }

    #[test]
    fn stale_execution_message_names_status() {
        let id = Uuid::new_v4();
        let err = EngineError::StaleExecution { id, status: ExecutionStatus::Cancelled };
        assert!(err.to_string().ends_with("is already cancelled"));
    }
}
