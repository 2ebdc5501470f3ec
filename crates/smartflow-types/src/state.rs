//! Persisted state snapshots and telemetry log entries.
//!
//! Both storage backends (SQLite and flat-file JSON) persist exactly these
//! shapes so either one is a drop-in replacement for the other.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A memory-buffer snapshot: substep id (or `input_data`) to output payload.
pub type StateSnapshot = BTreeMap<String, Value>;

/// A stored snapshot together with its bookkeeping columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub state_data: StateSnapshot,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One telemetry row: a substep execution, or a step summary when
/// `substep_id` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLogEntry {
    pub workflow_id: String,
    pub step_id: String,
    pub substep_id: String,
    pub input_data: Value,
    pub output_data: Value,
    pub prompt: String,
    pub retrieval_context: String,
    pub timestamp: DateTime<Utc>,
    pub latency: f64,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub success_status: bool,
    pub quality_score: f64,
    pub evaluation_explanation: String,
}

impl StepLogEntry {
    /// True for the aggregate entry written at the end of a step.
    pub fn is_step_summary(&self) -> bool {
        self.substep_id.is_empty()
    }
}
