//! Declarative success criteria for substeps and steps.
//!
//! Every field is optional; an absent field imposes no constraint. The
//! substep evaluator reads the format/keyword/length/judge fields, the step
//! evaluator additionally reads `min_quality_score` and
//! `all_substeps_must_succeed`.

use serde::{Deserialize, Serialize};

/// Expected structural format of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// The stringified output must parse as JSON.
    Json,
}

/// Success criteria attached to a substep or a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuccessCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,

    /// Keywords that must appear (case-insensitive substring) in the output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    /// Maximum output length in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// Minimum output length in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    /// Step-level only: threshold for the mean substep quality score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_quality_score: Option<f64>,

    /// Step-level only: require every substep to have succeeded.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub all_substeps_must_succeed: bool,

    /// Judge prompt template. Placeholders: `{goal}`, `{output}`, `{input_data}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_prompt: Option<String>,

    /// Goal statement passed to the judge and to prompt refinement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
}

impl SuccessCriteria {
    /// True when no criterion is configured.
    pub fn is_empty(&self) -> bool {
        *self == SuccessCriteria::default()
    }

    /// The goal string, or empty when unset.
    pub fn goal_or_empty(&self) -> &str {
        self.goal.as_deref().unwrap_or("")
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn with_max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn with_min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    pub fn with_min_quality_score(mut self, min: f64) -> Self {
        self.min_quality_score = Some(min);
        self
    }

    pub fn with_all_substeps_must_succeed(mut self) -> Self {
        self.all_substeps_must_succeed = true;
        self
    }

    pub fn with_judge(mut self, eval_prompt: impl Into<String>, goal: impl Into<String>) -> Self {
        self.eval_prompt = Some(eval_prompt.into());
        self.goal = Some(goal.into());
        self
    }
}
