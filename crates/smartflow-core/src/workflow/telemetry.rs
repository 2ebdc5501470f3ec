//! Best-effort telemetry recording for substep and step executions.
//!
//! A failed write is logged and swallowed; telemetry never changes the
//! outcome of a run.

use chrono::Utc;
use serde_json::Value;
use smartflow_types::evaluation::ExecutionMetrics;
use smartflow_types::state::StepLogEntry;

use crate::repository::state::StateStore;

/// The execution-specific part of a log entry.
#[derive(Debug, Clone)]
pub struct LogRecord<'a> {
    pub step_id: &'a str,
    /// Empty for the step-level summary entry.
    pub substep_id: &'a str,
    pub input_data: Value,
    pub output_data: Value,
    pub prompt: String,
    pub retrieval_context: String,
}

/// Writes [`StepLogEntry`] rows for one workflow run.
pub struct TelemetryRecorder<'a, S: StateStore> {
    store: &'a S,
    workflow_id: &'a str,
}

impl<'a, S: StateStore> TelemetryRecorder<'a, S> {
    pub fn new(store: &'a S, workflow_id: &'a str) -> Self {
        Self { store, workflow_id }
    }

    pub fn workflow_id(&self) -> &str {
        self.workflow_id
    }

    /// Build the full entry for `record` with `metrics`, stamped now.
    pub fn entry(&self, record: LogRecord<'_>, metrics: &ExecutionMetrics) -> StepLogEntry {
        StepLogEntry {
            workflow_id: self.workflow_id.to_string(),
            step_id: record.step_id.to_string(),
            substep_id: record.substep_id.to_string(),
            input_data: record.input_data,
            output_data: record.output_data,
            prompt: record.prompt,
            retrieval_context: record.retrieval_context,
            timestamp: Utc::now(),
            latency: metrics.latency,
            input_tokens: metrics.input_tokens,
            output_tokens: metrics.output_tokens,
            success_status: metrics.success_status,
            quality_score: metrics.quality_score,
            evaluation_explanation: metrics.evaluation_explanation.clone(),
        }
    }

    pub async fn record(&self, record: LogRecord<'_>, metrics: &ExecutionMetrics) {
        let entry = self.entry(record, metrics);
        if let Err(e) = self.store.log_step(&entry).await {
            tracing::warn!(
                workflow_id = self.workflow_id,
                step_id = entry.step_id.as_str(),
                substep_id = entry.substep_id.as_str(),
                error = %e,
                "failed to record telemetry"
            );
        }
    }
}
