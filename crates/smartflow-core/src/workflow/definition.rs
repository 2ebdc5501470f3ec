//! Workflow definition parsing, validation, and construction.
//!
//! Converts YAML or JSON files into the canonical `WorkflowDefinition`,
//! validates structural constraints (unique IDs, known transforms, threshold
//! ranges), and builds the executable [`Step`] list from a definition.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use smartflow_types::workflow::{StepDefinition, SubstepKind, WorkflowDefinition};
use thiserror::Error;

use crate::llm::box_provider::BoxLlmProvider;
use crate::memory::box_embedder::BoxEmbedder;

use super::step::Step;
use super::substep::Substep;
use super::transform::TransformRegistry;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or building a workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A transform substep names a function that is not registered.
    #[error("unknown transform '{function}' in substep '{substep}'")]
    UnknownTransform { substep: String, function: String },

    /// A prompt substep overrides the model but no provider was supplied for it.
    #[error("no provider registered for model '{0}'")]
    UnknownModel(String),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `WorkflowDefinition`.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let def: WorkflowDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Parse a JSON string into a validated `WorkflowDefinition`.
pub fn parse_workflow_json(json: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let def: WorkflowDefinition =
        serde_json::from_str(json).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Serialize a `WorkflowDefinition` to a YAML string.
pub fn serialize_workflow_yaml(def: &WorkflowDefinition) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(def).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

/// Load a workflow definition from disk. `.json` files are parsed as JSON,
/// everything else as YAML.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        parse_workflow_json(&content)
    } else {
        parse_workflow_yaml(&content)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `WorkflowDefinition`.
///
/// Checks:
/// - At least one step exists, and every step has at least one substep
/// - Step IDs are unique; substep IDs are unique across the whole workflow
/// - IDs are non-empty and substep IDs do not shadow `input_data`
/// - `relevance_threshold` lies in `[0, 1]`
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    if def.steps.is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow must have at least one step".to_string(),
        ));
    }

    let mut step_ids = HashSet::new();
    let mut substep_ids = HashSet::new();
    for step in &def.steps {
        if step.id.trim().is_empty() {
            return Err(WorkflowError::ValidationError(
                "step ID must not be empty".to_string(),
            ));
        }
        if !step_ids.insert(step.id.as_str()) {
            return Err(WorkflowError::ValidationError(format!(
                "duplicate step ID: '{}'",
                step.id
            )));
        }
        if step.substeps.is_empty() {
            return Err(WorkflowError::ValidationError(format!(
                "step '{}' must have at least one substep",
                step.id
            )));
        }

        for substep in &step.substeps {
            if substep.id.trim().is_empty() {
                return Err(WorkflowError::ValidationError(format!(
                    "step '{}' has a substep with an empty ID",
                    step.id
                )));
            }
            if substep.id == crate::memory::buffer::INPUT_DATA_KEY {
                return Err(WorkflowError::ValidationError(format!(
                    "substep ID '{}' is reserved",
                    substep.id
                )));
            }
            if !substep_ids.insert(substep.id.as_str()) {
                return Err(WorkflowError::ValidationError(format!(
                    "duplicate substep ID: '{}'",
                    substep.id
                )));
            }
            if !(0.0..=1.0).contains(&substep.relevance_threshold) {
                return Err(WorkflowError::ValidationError(format!(
                    "substep '{}' relevance_threshold {} is outside [0, 1]",
                    substep.id, substep.relevance_threshold
                )));
            }
        }
    }

    Ok(())
}

/// Distinct per-substep model overrides, in first-seen order.
pub fn required_models(def: &WorkflowDefinition) -> Vec<String> {
    let mut models: Vec<String> = Vec::new();
    for substep in def.steps.iter().flat_map(|s| &s.substeps) {
        if let SubstepKind::Prompt {
            model: Some(model), ..
        } = &substep.kind
        {
            if !models.contains(model) {
                models.push(model.clone());
            }
        }
    }
    models
}

/// Whether any substep asks for retrieval over the workflow's documents.
pub fn uses_rag(def: &WorkflowDefinition) -> bool {
    def.steps
        .iter()
        .flat_map(|s| &s.substeps)
        .any(|s| s.use_rag)
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Turns a validated definition into executable steps.
pub struct WorkflowBuilder<'a> {
    registry: &'a TransformRegistry,
    llm: Arc<BoxLlmProvider>,
    models: HashMap<String, Arc<BoxLlmProvider>>,
    embedder: Option<Arc<BoxEmbedder>>,
}

impl<'a> WorkflowBuilder<'a> {
    pub fn new(registry: &'a TransformRegistry, llm: Arc<BoxLlmProvider>) -> Self {
        Self {
            registry,
            llm,
            models: HashMap::new(),
            embedder: None,
        }
    }

    /// Provider for prompt substeps that override `model`.
    pub fn with_model(mut self, model: impl Into<String>, llm: Arc<BoxLlmProvider>) -> Self {
        self.models.insert(model.into(), llm);
        self
    }

    /// Embedder for past-output relevance on prompt substeps.
    pub fn with_embedder(mut self, embedder: Arc<BoxEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn build(&self, def: &WorkflowDefinition) -> Result<Vec<Step>, WorkflowError> {
        def.steps.iter().map(|step| self.build_step(step)).collect()
    }

    fn build_step(&self, def: &StepDefinition) -> Result<Step, WorkflowError> {
        let mut substeps = Vec::with_capacity(def.substeps.len());
        for sub in &def.substeps {
            let mut substep = match &sub.kind {
                SubstepKind::Prompt {
                    template,
                    refine_prompt,
                    model,
                } => {
                    let llm = match model {
                        Some(model) => self
                            .models
                            .get(model)
                            .cloned()
                            .ok_or_else(|| WorkflowError::UnknownModel(model.clone()))?,
                        None => Arc::clone(&self.llm),
                    };
                    let mut substep = Substep::prompt(&sub.id, template, llm);
                    if let Some(embedder) = &self.embedder {
                        substep = substep.with_embedder(Arc::clone(embedder));
                    }
                    if *refine_prompt {
                        substep = substep.with_refinement();
                    }
                    substep
                }
                SubstepKind::Transform { function } => {
                    let transform = self.registry.get(function).map_err(|_| {
                        WorkflowError::UnknownTransform {
                            substep: sub.id.clone(),
                            function: function.clone(),
                        }
                    })?;
                    Substep::transform(&sub.id, function, transform)
                }
            };

            substep = substep.with_criteria(sub.success_criteria.clone());
            if sub.use_rag {
                substep = substep.with_rag();
            }
            if sub.use_past_outputs {
                substep = substep.with_past_outputs(sub.relevance_threshold);
            }
            substeps.push(substep);
        }

        Ok(Step::new(&def.id, substeps).with_criteria(def.success_criteria.clone()))
    }
}

// ---------------------------------------------------------------------------
// Sample workflow
// ---------------------------------------------------------------------------

/// Sentiment analysis followed by text processing. Used by the CLI when no
/// workflow file is given.
pub const SAMPLE_WORKFLOW_YAML: &str = r#"
name: sample-analysis
description: Sentiment analysis with retrieval context, then text processing.
steps:
  - id: analysis_step
    success_criteria:
      min_quality_score: 0.8
      all_substeps_must_succeed: true
      eval_prompt: "Evaluate if the output forms a coherent analysis report.\nOutput: {output}\nReturn a score (0-1) and explanation."
      goal: Produce a coherent analysis report
    substeps:
      - id: sentiment_analysis
        kind: prompt
        template: "Analyze the following input for sentiment: {input_data}"
        use_rag: true
        refine_prompt: true
        use_past_outputs: true
        relevance_threshold: 0.7
        success_criteria:
          output_format: json
          keywords: [sentiment, confidence]
          eval_prompt: "Evaluate if the output accurately identifies the sentiment of '{input_data}'.\nOutput: {output}\nReturn a score (0-1) and explanation."
          goal: Identify sentiment with confidence score
      - id: text_processing
        kind: transform
        function: processed
        success_criteria:
          keywords: [processed]
          eval_prompt: "Evaluate if the output correctly processes the input.\nOutput: {output}\nReturn a score (0-1) and explanation."
          goal: Process input with a plain function
documents:
  - SmartFlow is a modular AI workflow engine that supports various LLM providers.
  - The system includes features like RAG, token tracking, and quality evaluation.
  - Workflows consist of steps, which contain substeps that can be LLM or non-LLM tasks.
  - The framework supports OpenAI and Ollama as LLM providers.
  - Storage backends include SQLite and JSON file storage for state persistence.
  - Quality evaluation includes automatic scoring and custom evaluation prompts.
  - Substeps can use past outputs for context and similarity-based relevance scoring.
"#;

/// The built-in sample definition.
pub fn sample_workflow() -> Result<WorkflowDefinition, WorkflowError> {
    parse_workflow_yaml(SAMPLE_WORKFLOW_YAML)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
