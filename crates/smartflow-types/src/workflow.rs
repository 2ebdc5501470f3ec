//! Workflow domain types for SmartFlow.
//!
//! Defines the declarative form of a workflow (`WorkflowDefinition`, loaded
//! from YAML or JSON) and the execution tracking types returned by a run
//! (`ExecutionResult`, `StepReport`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::criteria::SuccessCriteria;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A declarative workflow: an ordered list of steps plus an optional corpus
/// for retrieval-augmented substeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Fixed workflow id. When absent, each run gets a fresh UUIDv7.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered steps. Execution is strictly linear.
    pub steps: Vec<StepDefinition>,
    /// Inline documents indexed for substeps with `use_rag`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<String>,
}

// ---------------------------------------------------------------------------
// Step / Substep Definition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Step id, unique within a workflow.
    pub id: String,
    pub substeps: Vec<SubstepDefinition>,
    #[serde(default, skip_serializing_if = "SuccessCriteria::is_empty")]
    pub success_criteria: SuccessCriteria,
}

/// A single unit of work inside a step.
///
/// The variant is tagged by `kind`:
/// ```yaml
/// - id: sentiment
///   kind: prompt
///   template: "Classify: {input_data}"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstepDefinition {
    /// Substep id, unique across the whole workflow; also the memory buffer key.
    pub id: String,
    #[serde(flatten)]
    pub kind: SubstepKind,
    #[serde(default, skip_serializing_if = "SuccessCriteria::is_empty")]
    pub success_criteria: SuccessCriteria,
    #[serde(default)]
    pub use_rag: bool,
    #[serde(default)]
    pub use_past_outputs: bool,
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
}

pub fn default_relevance_threshold() -> f64 {
    0.7
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubstepKind {
    /// Render `template`, optionally refine it, then call the LLM.
    Prompt {
        template: String,
        #[serde(default)]
        refine_prompt: bool,
        /// Per-substep model override.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// Call a registered transform function by name.
    Transform { function: String },
}

// ---------------------------------------------------------------------------
// Execution Status
// ---------------------------------------------------------------------------

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Lifecycle of one step inside a run.
///
/// `Pending -> Running -> (Succeeded | Retry -> Running | Failed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Retry,
    Succeeded,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Failed)
    }
}

// ---------------------------------------------------------------------------
// Execution Results
// ---------------------------------------------------------------------------

/// Per-step summary of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step_id: String,
    pub status: StepStatus,
    /// Number of attempts made (1 = succeeded first time).
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What `execute` returns: the final output or the structured error payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub run_id: String,
    pub status: RunStatus,
    /// Last step's output, or `{"error": "..."}`.
    pub output: Value,
    pub completed_steps: Vec<String>,
    pub steps: Vec<StepReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Version metadata for a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowVersionInfo {
    pub workflow_id: String,
    pub version: i64,
    pub steps: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
