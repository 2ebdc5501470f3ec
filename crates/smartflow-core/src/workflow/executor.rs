//! Workflow controller: runs steps in order with per-step retries.
//!
//! Each step attempt executes against a scratch copy of the committed memory
//! buffer. A successful attempt is persisted through [`WorkflowState::commit`]
//! before the next step starts; a failed attempt (failed evaluation or failed
//! persistence) is discarded whole and the step re-runs from scratch until the
//! retry budget is spent.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value, json};
use smartflow_types::workflow::{
    ExecutionResult, RunStatus, StepReport, StepStatus, WorkflowVersionInfo,
};

use crate::memory::buffer::INPUT_DATA_KEY;
use crate::repository::state::StateStore;
use crate::retrieval::index::BoxRetrievalIndex;

use super::checkpoint::WorkflowState;
use super::retry::{RetryHandler, RetryPolicy};
use super::step::Step;
use super::telemetry::TelemetryRecorder;

/// A runnable workflow: ordered steps plus the state they checkpoint into.
pub struct Workflow<S: StateStore> {
    state: WorkflowState<S>,
    steps: Vec<Step>,
}

impl<S: StateStore> Workflow<S> {
    pub fn new(store: S, workflow_id: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            state: WorkflowState::new(store, workflow_id),
            steps,
        }
    }

    pub fn workflow_id(&self) -> &str {
        self.state.workflow_id()
    }

    pub fn state(&self) -> &WorkflowState<S> {
        &self.state
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id() == id)
    }

    pub fn step_ids(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.id().to_string()).collect()
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Attach `index` to every substep with retrieval enabled. Returns how
    /// many substeps took it.
    pub fn attach_index(&self, index: Arc<BoxRetrievalIndex>) -> usize {
        self.steps
            .iter()
            .flat_map(|s| s.substeps())
            .filter(|s| s.uses_rag())
            .filter(|s| s.attach_index(Arc::clone(&index)))
            .count()
    }

    pub fn version_info(&self) -> WorkflowVersionInfo {
        WorkflowVersionInfo {
            workflow_id: self.workflow_id().to_string(),
            version: self.state.version(),
            steps: self.step_ids(),
            timestamp: Utc::now(),
        }
    }

    /// Index of the first step to run. Unknown ids start from the beginning.
    fn start_index(&self, resume_from: Option<&str>) -> usize {
        let Some(step_id) = resume_from else {
            return 0;
        };
        match self.steps.iter().position(|s| s.id() == step_id) {
            Some(index) => index,
            None => {
                tracing::warn!(
                    workflow_id = self.workflow_id(),
                    step_id,
                    "resume step not found, starting from the first step"
                );
                0
            }
        }
    }

    /// Run the workflow.
    ///
    /// `initial_input` is normally an object with an `input_data` field; any
    /// other value is wrapped as `{"input_data": value}`. Never returns an
    /// error: an exhausted step yields a failed result whose output is
    /// `{"error": "..."}`.
    pub async fn execute(
        &mut self,
        initial_input: Value,
        max_retries: u32,
        resume_from: Option<&str>,
    ) -> ExecutionResult {
        let workflow_id = self.workflow_id().to_string();
        let policy = RetryPolicy::new(max_retries);
        let mut reports: Vec<StepReport> = Vec::new();
        let mut completed_steps: Vec<String> = Vec::new();

        let mut current = match initial_input {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert(INPUT_DATA_KEY.to_string(), other);
                map
            }
        };

        if let Err(e) = self.state.load().await {
            let message = format!("failed to load workflow state: {e}");
            tracing::error!(
                workflow_id = workflow_id.as_str(),
                error = %e,
                "failed to load workflow state"
            );
            return failed_result(workflow_id, message, completed_steps, reports);
        }
        if let Some(input_data) = current.get(INPUT_DATA_KEY) {
            self.state.memory_mut().seed_input(input_data.clone());
        }

        let start = self.start_index(resume_from);
        tracing::info!(
            workflow_id = workflow_id.as_str(),
            steps = self.steps.len(),
            start,
            max_retries,
            "starting workflow execution"
        );

        let run_start = std::time::Instant::now();
        let mut last_output: Option<Map<String, Value>> = None;

        for step in &self.steps[start..] {
            let step_id = step.id();
            let mut attempt: u32 = 0;

            loop {
                attempt += 1;
                tracing::info!(
                    workflow_id = workflow_id.as_str(),
                    step_id,
                    attempt,
                    status = ?StepStatus::Running,
                    "running step"
                );

                let mut scratch = self.state.memory().clone();
                let telemetry = TelemetryRecorder::new(self.state.store(), &workflow_id);
                let outcome = step.execute(&current, &mut scratch, &telemetry).await;
                let quality_score = outcome.metrics.quality_score;

                let failure = if outcome.succeeded() {
                    match self.state.commit(scratch).await {
                        Ok(version) => {
                            tracing::debug!(
                                workflow_id = workflow_id.as_str(),
                                step_id,
                                version,
                                "step committed"
                            );
                            None
                        }
                        Err(e) => Some(e.to_string()),
                    }
                } else {
                    Some(format!("Step {step_id} failed evaluation"))
                };

                let Some(error) = failure else {
                    reports.push(StepReport {
                        step_id: step_id.to_string(),
                        status: StepStatus::Succeeded,
                        attempts: attempt,
                        quality_score: Some(quality_score),
                        error: None,
                    });
                    completed_steps.push(step_id.to_string());
                    current = outcome.output.clone();
                    last_output = Some(outcome.output);
                    break;
                };

                match RetryHandler::next_status(&policy, attempt) {
                    StepStatus::Retry => {
                        tracing::warn!(
                            workflow_id = workflow_id.as_str(),
                            step_id,
                            attempt,
                            error = error.as_str(),
                            explanation = outcome.metrics.evaluation_explanation.as_str(),
                            "step attempt failed, retrying"
                        );
                    }
                    _ => {
                        tracing::error!(
                            workflow_id = workflow_id.as_str(),
                            step_id,
                            attempts = attempt,
                            error = error.as_str(),
                            "step failed, halting workflow"
                        );
                        reports.push(StepReport {
                            step_id: step_id.to_string(),
                            status: StepStatus::Failed,
                            attempts: attempt,
                            quality_score: Some(quality_score),
                            error: Some(error.clone()),
                        });
                        return failed_result(workflow_id, error, completed_steps, reports);
                    }
                }
            }
        }

        tracing::info!(
            workflow_id = workflow_id.as_str(),
            completed = completed_steps.len(),
            duration_ms = run_start.elapsed().as_millis() as u64,
            version = self.state.version(),
            "workflow completed"
        );

        ExecutionResult {
            run_id: workflow_id,
            status: RunStatus::Completed,
            output: Value::Object(last_output.unwrap_or(current)),
            completed_steps,
            steps: reports,
            error: None,
        }
    }
}

fn failed_result(
    run_id: String,
    error: String,
    completed_steps: Vec<String>,
    steps: Vec<StepReport>,
) -> ExecutionResult {
    ExecutionResult {
        run_id,
        status: RunStatus::Failed,
        output: json!({"error": error}),
        completed_steps,
        steps,
        error: Some(error),
    }
}
