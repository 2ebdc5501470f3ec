//! Step executor: an ordered group of substeps judged together.

use serde_json::{Map, Value};
use smartflow_types::criteria::SuccessCriteria;
use smartflow_types::evaluation::{EvaluationResult, ExecutionMetrics};

use crate::evaluation::evaluator::Evaluator;
use crate::llm::box_provider::BoxLlmProvider;
use crate::memory::buffer::{INPUT_DATA_KEY, MemoryBuffer};
use crate::repository::state::StateStore;

use super::substep::Substep;
use super::telemetry::{LogRecord, TelemetryRecorder};

/// Input key carrying the running step's id into each substep.
pub const STEP_ID_KEY: &str = "step_id";

/// Result of one step attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Substep id to that substep's output.
    pub output: Map<String, Value>,
    /// Summed latency and tokens with the step-level evaluation.
    pub metrics: ExecutionMetrics,
    pub substeps: Vec<ExecutionMetrics>,
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        self.metrics.success_status
    }

    pub fn evaluation(&self) -> EvaluationResult {
        self.metrics.evaluation()
    }
}

#[derive(Debug)]
pub struct Step {
    id: String,
    substeps: Vec<Substep>,
    criteria: SuccessCriteria,
}

impl Step {
    pub fn new(id: impl Into<String>, substeps: Vec<Substep>) -> Self {
        Self {
            id: id.into(),
            substeps,
            criteria: SuccessCriteria::default(),
        }
    }

    pub fn with_criteria(mut self, criteria: SuccessCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn substeps(&self) -> &[Substep] {
        &self.substeps
    }

    pub fn criteria(&self) -> &SuccessCriteria {
        &self.criteria
    }

    /// Judge model for step-level `eval_prompt`: the first prompt substep's model.
    pub fn judge(&self) -> Option<&BoxLlmProvider> {
        self.substeps.iter().find_map(Substep::llm)
    }

    /// Run every substep in order, feeding each one's output into the next
    /// substep's input, then evaluate the step as a whole.
    pub async fn execute<S: StateStore>(
        &self,
        input: &Map<String, Value>,
        buffer: &mut MemoryBuffer,
        telemetry: &TelemetryRecorder<'_, S>,
    ) -> StepOutcome {
        tracing::info!(
            step_id = self.id.as_str(),
            substeps = self.substeps.len(),
            "executing step"
        );

        let mut current = input.clone();
        let mut output = Map::new();
        let mut substeps = Vec::with_capacity(self.substeps.len());

        for substep in &self.substeps {
            current.insert(STEP_ID_KEY.to_string(), Value::String(self.id.clone()));
            let outcome = substep.execute(&current, buffer, &self.id, telemetry).await;
            if let Value::Object(fields) = &outcome.output {
                for (key, value) in fields {
                    current.insert(key.clone(), value.clone());
                }
            }
            output.insert(substep.id().to_string(), outcome.output);
            substeps.push(outcome.metrics);
        }

        let latency: f64 = substeps.iter().map(|m| m.latency).sum();
        let input_tokens: u32 = substeps.iter().map(|m| m.input_tokens).sum();
        let output_tokens: u32 = substeps.iter().map(|m| m.output_tokens).sum();

        let input_data = input
            .get(INPUT_DATA_KEY)
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()));
        let step_output = Value::Object(output.clone());
        let evaluation = Evaluator::evaluate_step(
            &step_output,
            &substeps,
            &self.criteria,
            &input_data,
            self.judge(),
        )
        .await;
        let metrics = ExecutionMetrics::new(latency, input_tokens, output_tokens, evaluation);

        tracing::info!(
            step_id = self.id.as_str(),
            success = metrics.success_status,
            quality_score = metrics.quality_score,
            "step evaluated"
        );

        telemetry
            .record(
                LogRecord {
                    step_id: &self.id,
                    substep_id: "",
                    input_data: Value::Object(input.clone()),
                    output_data: step_output,
                    prompt: String::new(),
                    retrieval_context: String::new(),
                },
                &metrics,
            )
            .await;

        StepOutcome {
            output,
            metrics,
            substeps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;
    use smartflow_types::error::TransformError;

    use crate::testing::{MemoryStore, ScriptedProvider};
    use crate::workflow::transform::{sync_transform, uppercase};

    fn input() -> Map<String, Value> {
        json!({"input_data": "hello"}).as_object().cloned().unwrap()
    }

    fn upper_then_echo(provider: ScriptedProvider) -> Step {
        let llm = Arc::new(BoxLlmProvider::new(provider));
        Step::new(
            "analysis",
            vec![
                Substep::transform("A", "uppercase", sync_transform(uppercase)),
                Substep::prompt("B", "Saw {A} then {result}", llm)
                    .with_criteria(SuccessCriteria::default().with_keywords(["hello"])),
            ],
        )
    }

    #[tokio::test]
    async fn test_next_substep_sees_previous_output() {
        let provider = ScriptedProvider::replying(["hello back"]).with_usage(4, 2);
        let prompts = provider.prompts();
        let step = upper_then_echo(provider);
        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        let mut buffer = MemoryBuffer::new();

        let outcome = step.execute(&input(), &mut buffer, &telemetry).await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.output["A"], json!({"result": "HELLO"}));
        assert_eq!(outcome.output["B"], json!({"result": "hello back"}));
        assert_eq!(
            prompts.lock().unwrap().as_slice(),
            [r#"Saw {"result":"HELLO"} then HELLO"#]
        );
        assert_eq!(outcome.metrics.input_tokens, 4);
        assert_eq!(outcome.metrics.output_tokens, 2);
        assert_eq!(outcome.substeps.len(), 2);
    }

    #[tokio::test]
    async fn test_substeps_see_step_id() {
        let provider = ScriptedProvider::replying(["done"]);
        let prompts = provider.prompts();
        let llm = Arc::new(BoxLlmProvider::new(provider));
        let step = Step::new(
            "analysis",
            vec![Substep::prompt("B", "Step {step_id}: {input_data}", llm)],
        );
        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        let mut buffer = MemoryBuffer::new();

        let outcome = step.execute(&input(), &mut buffer, &telemetry).await;

        assert!(outcome.succeeded());
        assert_eq!(prompts.lock().unwrap().as_slice(), ["Step analysis: hello"]);
        assert_eq!(store.logs()[0].input_data["step_id"], "analysis");
    }

    #[tokio::test]
    async fn test_step_summary_logged_last() {
        let step = upper_then_echo(ScriptedProvider::replying(["hello"]));
        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        let mut buffer = MemoryBuffer::new();

        step.execute(&input(), &mut buffer, &telemetry).await;

        let logs = store.logs();
        let ids: Vec<&str> = logs.iter().map(|e| e.substep_id.as_str()).collect();
        assert_eq!(ids, ["A", "B", ""]);
        assert!(logs[2].is_step_summary());
        assert_eq!(logs[2].output_data["A"]["result"], "HELLO");
    }

    #[tokio::test]
    async fn test_min_quality_score_uses_mean() {
        // B misses its keyword: scores 1.0 and 0.8, mean 0.9.
        let step = upper_then_echo(ScriptedProvider::replying(["nothing"]))
            .with_criteria(SuccessCriteria::default().with_min_quality_score(0.95));
        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        let mut buffer = MemoryBuffer::new();

        let outcome = step.execute(&input(), &mut buffer, &telemetry).await;

        assert!(!outcome.succeeded());
        assert!((outcome.metrics.quality_score - 0.9).abs() < 1e-9);
        assert_eq!(
            outcome.metrics.evaluation_explanation,
            "Average quality score 0.90 below threshold 0.95"
        );
    }

    #[tokio::test]
    async fn test_all_substeps_must_succeed() {
        let failing = sync_transform(|_| Err(TransformError::Failed("boom".into())));
        let step = Step::new(
            "s",
            vec![
                Substep::transform("ok", "uppercase", sync_transform(uppercase)),
                Substep::transform("bad", "failing", failing),
            ],
        )
        .with_criteria(SuccessCriteria::default().with_all_substeps_must_succeed());
        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        let mut buffer = MemoryBuffer::new();

        let outcome = step.execute(&input(), &mut buffer, &telemetry).await;

        assert!(!outcome.succeeded());
        assert!((outcome.metrics.quality_score - 0.8).abs() < 1e-9);
        assert_eq!(outcome.output["bad"], json!({"error": "transform failed: boom"}));
        // The failed substep leaves no buffer entry.
        assert!(buffer.contains("ok"));
        assert!(!buffer.contains("bad"));
    }

    #[tokio::test]
    async fn test_step_judge_uses_first_prompt_model() {
        let provider = ScriptedProvider::replying(["hello", "0.5\nhalf right"]);
        let prompts = provider.prompts();
        let step = upper_then_echo(provider).with_criteria(
            SuccessCriteria::default().with_judge("Rate {output} for {goal}", "greeting"),
        );
        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        let mut buffer = MemoryBuffer::new();

        let outcome = step.execute(&input(), &mut buffer, &telemetry).await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.metrics.quality_score, 0.5);
        let prompts = prompts.lock().unwrap();
        assert!(prompts[1].starts_with("Rate {\"A\":"));
        assert!(prompts[1].ends_with("for greeting"));
    }
}
