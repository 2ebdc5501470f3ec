//! Evaluation results and execution metrics.

use serde::{Deserialize, Serialize};

/// Explanation used when no criterion produced a message.
pub const NO_ISSUES: &str = "No issues detected.";

/// Outcome of scoring an output against a [`SuccessCriteria`](crate::criteria::SuccessCriteria).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub success_status: bool,
    /// Multiplicative composite, always within `[0.0, 1.0]`.
    pub quality_score: f64,
    pub evaluation_explanation: String,
}

impl EvaluationResult {
    /// A passing result with a perfect score.
    pub fn passed() -> Self {
        Self {
            success_status: true,
            quality_score: 1.0,
            evaluation_explanation: NO_ISSUES.to_string(),
        }
    }

    /// The result recorded when a substep could not execute at all.
    pub fn execution_failed(message: &str) -> Self {
        Self {
            success_status: false,
            quality_score: 0.0,
            evaluation_explanation: format!("Execution failed: {message}"),
        }
    }
}

/// Per-substep or per-step execution metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Wall-clock latency in seconds.
    pub latency: f64,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub quality_score: f64,
    pub success_status: bool,
    pub evaluation_explanation: String,
}

impl ExecutionMetrics {
    /// Combine timing/token measurements with an evaluation.
    pub fn new(latency: f64, input_tokens: u32, output_tokens: u32, eval: EvaluationResult) -> Self {
        Self {
            latency: latency.max(0.0),
            input_tokens,
            output_tokens,
            quality_score: eval.quality_score,
            success_status: eval.success_status,
            evaluation_explanation: eval.evaluation_explanation,
        }
    }

    /// Metrics for a substep whose execution raised an error.
    pub fn failed(message: &str) -> Self {
        Self::new(0.0, 0, 0, EvaluationResult::execution_failed(message))
    }

    /// The evaluation part of these metrics.
    pub fn evaluation(&self) -> EvaluationResult {
        EvaluationResult {
            success_status: self.success_status,
            quality_score: self.quality_score,
            evaluation_explanation: self.evaluation_explanation.clone(),
        }
    }
}
