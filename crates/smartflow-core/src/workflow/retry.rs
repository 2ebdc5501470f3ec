//! Retry decisions for failed step attempts.
//!
//! Stateless: the controller tracks attempt numbers and passes them in. A
//! retried step always re-runs from scratch with identical inputs.

use smartflow_types::workflow::StepStatus;

/// Retry budget for a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Re-runs allowed after the first attempt.
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Total attempts a step may take, first run included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Stateless retry handler for step failures.
pub struct RetryHandler;

impl RetryHandler {
    /// Whether another attempt is allowed after `attempt` failed.
    ///
    /// `attempt` is 1-based (first execution is attempt 1).
    pub fn should_retry(policy: &RetryPolicy, attempt: u32) -> bool {
        attempt < policy.max_attempts()
    }

    /// Status a step moves to after a failed `attempt`.
    pub fn next_status(policy: &RetryPolicy, attempt: u32) -> StepStatus {
        if Self::should_retry(policy, attempt) {
            StepStatus::Retry
        } else {
            StepStatus::Failed
        }
    }
}
