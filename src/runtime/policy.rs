//! Retry and timeout policy
//!
//! Pure decision functions; no clocks, no I/O. The state machine asks
//! `decide` after every failed attempt and `timeout_for` before each call.

use crate::config::EngineConfig;
use crate::error::ErrorKind;
use crate::workflow::types::WorkflowAction;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub backoff: Duration,
}

/// Exponential backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub ceiling: Duration,
    /// Applied when an action declares no `timeout_seconds`
    pub default_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            base: config.retry_base(),
            ceiling: config.retry_ceiling(),
            default_timeout: config.default_timeout(),
        }
    }

    /// Decide whether to retry after `attempt` (1-based) failed.
    ///
    /// `max_retries` counts retries, not attempts: an action may run at most
    /// `max_retries + 1` times.
    pub fn decide(&self, attempt: u32, max_retries: u32, retry_on_failure: bool, last_error: ErrorKind) -> RetryDecision {
        let should_retry = retry_on_failure
            && last_error == ErrorKind::Retryable
            && attempt <= max_retries;

        RetryDecision {
            should_retry,
            backoff: if should_retry { self.backoff(attempt) } else { Duration::ZERO },
        }
    }

    /// `base * 2^(attempt-1)`, capped at the ceiling
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.ceiling)
            .min(self.ceiling)
    }

    pub fn timeout_for(&self, action: &WorkflowAction) -> Duration {
        action.timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            ceiling: Duration::from_secs(30),
            default_timeout: Duration::from_secs(300),
        }
    }
}
