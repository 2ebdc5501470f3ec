//! Scoring of substep and step outputs against [`SuccessCriteria`].
//!
//! Every rule compounds onto a running score that starts at 1.0; the final
//! score is clamped to `[0.0, 1.0]`. Rule failures flip `success_status`,
//! but a failing judge call only records its error in the explanation.

use serde_json::{Map, Value};
use smartflow_types::criteria::{OutputFormat, SuccessCriteria};
use smartflow_types::error::TemplateError;
use smartflow_types::evaluation::{EvaluationResult, ExecutionMetrics, NO_ISSUES};
use smartflow_types::llm::LlmError;

use crate::llm::box_provider::BoxLlmProvider;
use crate::workflow::template::{render, value_as_text};

const JSON_PENALTY: f64 = 0.5;
const KEYWORD_PENALTY: f64 = 0.8;
const LENGTH_PENALTY: f64 = 0.7;
const SUBSTEP_FAILURE_PENALTY: f64 = 0.8;

/// Errors from a delegated judge call. Never escape the evaluator.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("{0}")]
    Template(#[from] TemplateError),

    #[error("{0}")]
    Llm(#[from] LlmError),

    #[error("could not parse score from judge reply '{0}'")]
    Score(String),
}

/// Running score and messages while rules are applied.
struct Tally {
    success: bool,
    score: f64,
    messages: Vec<String>,
}

impl Tally {
    fn new() -> Self {
        Self {
            success: true,
            score: 1.0,
            messages: Vec::new(),
        }
    }

    fn fail(&mut self, factor: f64, message: String) {
        self.success = false;
        self.score *= factor;
        self.messages.push(message);
    }

    async fn judge(
        &mut self,
        judge: Option<&BoxLlmProvider>,
        template: &str,
        vars: Map<String, Value>,
        failure_prefix: &str,
    ) {
        let Some(judge) = judge else {
            tracing::debug!("eval_prompt configured without a judge model, skipping");
            return;
        };
        match run_judge(judge, template, &vars).await {
            Ok((score, reply)) => {
                self.score *= score;
                self.messages.push(reply);
            }
            Err(e) => {
                tracing::warn!(error = %e, "judged evaluation failed");
                self.messages.push(format!("{failure_prefix}: {e}"));
            }
        }
    }

    fn finish(self) -> EvaluationResult {
        EvaluationResult {
            success_status: self.success,
            quality_score: self.score.clamp(0.0, 1.0),
            evaluation_explanation: if self.messages.is_empty() {
                NO_ISSUES.to_string()
            } else {
                self.messages.join("\n")
            },
        }
    }
}

/// Render the judge prompt, call the model, and parse the leading score.
async fn run_judge(
    judge: &BoxLlmProvider,
    template: &str,
    vars: &Map<String, Value>,
) -> Result<(f64, String), JudgeError> {
    let prompt = render(template, vars)?;
    let reply = judge.complete_prompt(&prompt).await?.content;
    let first_line = reply.lines().next().unwrap_or("").trim();
    let score = first_line
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite())
        .ok_or_else(|| JudgeError::Score(first_line.to_string()))?;
    Ok((score, reply))
}

/// The text form of an output that criteria are checked against.
///
/// A `result` field is preferred: strings are used as-is, other values in
/// compact JSON. Outputs without `result` are rendered whole.
pub fn output_text(output: &Value) -> String {
    match output.get("result") {
        Some(result) => value_as_text(result),
        None => value_as_text(output),
    }
}

/// Stateless evaluator. All inputs are passed per call.
pub struct Evaluator;

impl Evaluator {
    /// Score a substep output.
    ///
    /// `input_data` is the original input exposed to the judge template as
    /// `{input_data}`; `judge` is the model used for `eval_prompt`.
    pub async fn evaluate(
        output: &str,
        criteria: &SuccessCriteria,
        input_data: &Value,
        judge: Option<&BoxLlmProvider>,
    ) -> EvaluationResult {
        let mut tally = Tally::new();

        if criteria.output_format == Some(OutputFormat::Json)
            && serde_json::from_str::<Value>(output).is_err()
        {
            tally.fail(JSON_PENALTY, "Output is not valid JSON.".to_string());
        }

        if !criteria.keywords.is_empty() {
            let haystack = output.to_lowercase();
            let missing: Vec<&str> = criteria
                .keywords
                .iter()
                .filter(|kw| !haystack.contains(&kw.to_lowercase()))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                tally.fail(
                    KEYWORD_PENALTY,
                    format!("Missing keywords: {}", missing.join(", ")),
                );
            }
        }

        let length = output.chars().count();
        if let Some(max) = criteria.max_length {
            if length > max {
                tally.fail(
                    LENGTH_PENALTY,
                    format!("Output exceeds max length of {max} characters."),
                );
            }
        }
        if let Some(min) = criteria.min_length {
            if length < min {
                tally.fail(
                    LENGTH_PENALTY,
                    format!("Output is shorter than min length of {min} characters."),
                );
            }
        }

        if let Some(template) = &criteria.eval_prompt {
            let mut vars = Map::new();
            vars.insert("goal".into(), Value::String(criteria.goal_or_empty().to_string()));
            vars.insert("output".into(), Value::String(output.to_string()));
            vars.insert("input_data".into(), input_data.clone());
            tally.judge(judge, template, vars, "Evaluation failed").await;
        }

        tally.finish()
    }

    /// Score a whole step from its per-substep metrics and combined output.
    pub async fn evaluate_step(
        step_output: &Value,
        substep_metrics: &[ExecutionMetrics],
        criteria: &SuccessCriteria,
        input_data: &Value,
        judge: Option<&BoxLlmProvider>,
    ) -> EvaluationResult {
        let mut tally = Tally::new();

        let mean = if substep_metrics.is_empty() {
            0.0
        } else {
            substep_metrics.iter().map(|m| m.quality_score).sum::<f64>()
                / substep_metrics.len() as f64
        };

        if let Some(min) = criteria.min_quality_score {
            if mean < min {
                tally.fail(
                    mean,
                    format!("Average quality score {mean:.2} below threshold {min}"),
                );
            }
        }

        if criteria.all_substeps_must_succeed && !substep_metrics.iter().all(|m| m.success_status) {
            tally.fail(
                SUBSTEP_FAILURE_PENALTY,
                "Not all substeps succeeded.".to_string(),
            );
        }

        if let Some(template) = &criteria.eval_prompt {
            let mut vars = Map::new();
            vars.insert("goal".into(), Value::String(criteria.goal_or_empty().to_string()));
            vars.insert("output".into(), Value::String(step_output.to_string()));
            vars.insert("input_data".into(), input_data.clone());
            tally.judge(judge, template, vars, "Step evaluation failed").await;
        }

        tally.finish()
    }
}
