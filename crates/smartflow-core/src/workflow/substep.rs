//! Substep executor: one unit of work inside a step.
//!
//! A substep is either an LLM prompt or a plain transform. Execution never
//! fails to the caller: any error becomes a failed [`SubstepOutcome`] with
//! output `{"error": message}` and a zero score. This is the only place that
//! writes to the [`MemoryBuffer`].

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use serde_json::{Map, Value, json};
use smartflow_types::criteria::SuccessCriteria;
use smartflow_types::error::{RetrievalError, TemplateError, TransformError};
use smartflow_types::evaluation::ExecutionMetrics;
use smartflow_types::llm::LlmError;
use smartflow_types::workflow::default_relevance_threshold;

use crate::evaluation::evaluator::{Evaluator, output_text};
use crate::llm::box_provider::BoxLlmProvider;
use crate::memory::box_embedder::BoxEmbedder;
use crate::memory::buffer::{INPUT_DATA_KEY, MemoryBuffer};
use crate::memory::similarity::cosine_similarity;
use crate::repository::state::StateStore;
use crate::retrieval::index::BoxRetrievalIndex;

use super::telemetry::{LogRecord, TelemetryRecorder};
use super::template::{render, value_as_text};
use super::transform::Transform;

/// Passages fetched per retrieval query.
pub const RAG_TOP_K: usize = 3;

/// Key under which retrieved passages are exposed to templates.
pub const RETRIEVAL_CONTEXT_KEY: &str = "retrieval_context";

const REFINE_TEMPLATE: &str = "Refine this prompt to be clear, focused, and aligned with the goal '{goal}', incorporating the provided keywords:\nPrompt: {prompt}";

const KEYWORD_STOPWORDS: [&str; 4] = ["this", "that", "with", "from"];
const KEYWORDS_PER_SOURCE: usize = 5;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures inside a substep. Converted into a failed outcome, never returned.
#[derive(Debug, thiserror::Error)]
pub enum SubstepError {
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("embedding failed: {0}")]
    Embedding(LlmError),
}

// ---------------------------------------------------------------------------
// Substep
// ---------------------------------------------------------------------------

/// What a substep does when it runs.
pub enum SubstepAction {
    Prompt {
        template: String,
        llm: Arc<BoxLlmProvider>,
        embedder: Option<Arc<BoxEmbedder>>,
        refine_prompt: bool,
    },
    Transform {
        name: String,
        function: Arc<dyn Transform>,
    },
}

impl std::fmt::Debug for SubstepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubstepAction::Prompt {
                template,
                llm,
                refine_prompt,
                ..
            } => f
                .debug_struct("Prompt")
                .field("template", template)
                .field("llm", &llm.name())
                .field("refine_prompt", refine_prompt)
                .finish(),
            SubstepAction::Transform { name, .. } => {
                f.debug_struct("Transform").field("name", name).finish()
            }
        }
    }
}

/// Result of one substep execution.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstepOutcome {
    pub output: Value,
    pub metrics: ExecutionMetrics,
}

/// Everything produced by a successful run, before evaluation.
struct RunOutput {
    output: Value,
    prompt_input: Map<String, Value>,
    prompt: String,
    retrieval_context: String,
    input_tokens: u32,
    output_tokens: u32,
}

/// A single unit of work. Immutable after construction except for the
/// lazily attached retrieval index.
#[derive(Debug)]
pub struct Substep {
    id: String,
    action: SubstepAction,
    criteria: SuccessCriteria,
    use_rag: bool,
    use_past_outputs: bool,
    relevance_threshold: f64,
    index: OnceLock<Arc<BoxRetrievalIndex>>,
}

impl Substep {
    /// An LLM-backed substep rendering `template` against its input.
    pub fn prompt(id: impl Into<String>, template: impl Into<String>, llm: Arc<BoxLlmProvider>) -> Self {
        Self::new(
            id,
            SubstepAction::Prompt {
                template: template.into(),
                llm,
                embedder: None,
                refine_prompt: false,
            },
        )
    }

    /// A plain function substep.
    pub fn transform(
        id: impl Into<String>,
        name: impl Into<String>,
        function: Arc<dyn Transform>,
    ) -> Self {
        Self::new(
            id,
            SubstepAction::Transform {
                name: name.into(),
                function,
            },
        )
    }

    fn new(id: impl Into<String>, action: SubstepAction) -> Self {
        Self {
            id: id.into(),
            action,
            criteria: SuccessCriteria::default(),
            use_rag: false,
            use_past_outputs: false,
            relevance_threshold: default_relevance_threshold(),
            index: OnceLock::new(),
        }
    }

    pub fn with_criteria(mut self, criteria: SuccessCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    /// Embedder for past-output relevance. Ignored by transform substeps.
    pub fn with_embedder(mut self, embedder: Arc<BoxEmbedder>) -> Self {
        if let SubstepAction::Prompt { embedder: slot, .. } = &mut self.action {
            *slot = Some(embedder);
        }
        self
    }

    /// Refine the rendered prompt with a second LLM call before sending it.
    pub fn with_refinement(mut self) -> Self {
        if let SubstepAction::Prompt { refine_prompt, .. } = &mut self.action {
            *refine_prompt = true;
        }
        self
    }

    pub fn with_rag(mut self) -> Self {
        self.use_rag = true;
        self
    }

    pub fn with_past_outputs(mut self, relevance_threshold: f64) -> Self {
        self.use_past_outputs = true;
        self.relevance_threshold = relevance_threshold;
        self
    }

    /// Attach the retrieval index. Only the first call takes effect.
    pub fn attach_index(&self, index: Arc<BoxRetrievalIndex>) -> bool {
        self.index.set(index).is_ok()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn action(&self) -> &SubstepAction {
        &self.action
    }

    pub fn criteria(&self) -> &SuccessCriteria {
        &self.criteria
    }

    pub fn uses_rag(&self) -> bool {
        self.use_rag
    }

    pub fn has_index(&self) -> bool {
        self.index.get().is_some()
    }

    /// The model used for this substep, and for judging its output.
    pub fn llm(&self) -> Option<&BoxLlmProvider> {
        match &self.action {
            SubstepAction::Prompt { llm, .. } => Some(llm.as_ref()),
            SubstepAction::Transform { .. } => None,
        }
    }

    fn embedder(&self) -> Option<&BoxEmbedder> {
        match &self.action {
            SubstepAction::Prompt { embedder, .. } => embedder.as_deref(),
            SubstepAction::Transform { .. } => None,
        }
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Run the substep against `input`, writing its output into `buffer` on
    /// success and recording one telemetry entry either way.
    pub async fn execute<S: StateStore>(
        &self,
        input: &Map<String, Value>,
        buffer: &mut MemoryBuffer,
        step_id: &str,
        telemetry: &TelemetryRecorder<'_, S>,
    ) -> SubstepOutcome {
        tracing::debug!(step_id, substep_id = self.id.as_str(), "executing substep");
        let started = Instant::now();

        match self.run(input, buffer, step_id).await {
            Ok(run) => {
                let latency = started.elapsed().as_secs_f64();
                let text = output_text(&run.output);
                let input_data = run
                    .prompt_input
                    .get(INPUT_DATA_KEY)
                    .cloned()
                    .unwrap_or_else(|| Value::String(String::new()));
                let evaluation =
                    Evaluator::evaluate(&text, &self.criteria, &input_data, self.llm()).await;
                let metrics = ExecutionMetrics::new(
                    latency,
                    run.input_tokens,
                    run.output_tokens,
                    evaluation,
                );

                buffer.insert(self.id.clone(), run.output.clone());

                tracing::debug!(
                    step_id,
                    substep_id = self.id.as_str(),
                    success = metrics.success_status,
                    quality_score = metrics.quality_score,
                    latency = metrics.latency,
                    "substep finished"
                );

                telemetry
                    .record(
                        LogRecord {
                            step_id,
                            substep_id: &self.id,
                            input_data: Value::Object(run.prompt_input),
                            output_data: run.output.clone(),
                            prompt: run.prompt,
                            retrieval_context: run.retrieval_context,
                        },
                        &metrics,
                    )
                    .await;

                SubstepOutcome {
                    output: run.output,
                    metrics,
                }
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(
                    step_id,
                    substep_id = self.id.as_str(),
                    error = %message,
                    "substep execution failed"
                );
                let metrics = ExecutionMetrics::failed(&message);
                let output = json!({"error": message});

                telemetry
                    .record(
                        LogRecord {
                            step_id,
                            substep_id: &self.id,
                            input_data: Value::Object(input.clone()),
                            output_data: output.clone(),
                            prompt: String::new(),
                            retrieval_context: String::new(),
                        },
                        &metrics,
                    )
                    .await;

                SubstepOutcome { output, metrics }
            }
        }
    }

    async fn run(
        &self,
        input: &Map<String, Value>,
        buffer: &MemoryBuffer,
        step_id: &str,
    ) -> Result<RunOutput, SubstepError> {
        let past_outputs = self.relevant_past_outputs(input, buffer).await?;

        let mut prompt_input = input.clone();
        for (key, value) in buffer.iter() {
            prompt_input.insert(key.clone(), value.clone());
        }
        for (key, text) in past_outputs {
            prompt_input.insert(key, Value::String(text));
        }

        let mut retrieval_context = String::new();
        if self.use_rag {
            if let Some(index) = self.index.get() {
                let query = prompt_input
                    .get(INPUT_DATA_KEY)
                    .map(value_as_text)
                    .unwrap_or_default();
                retrieval_context = index.search(&query, RAG_TOP_K).await?.join("\n");
                prompt_input.insert(
                    RETRIEVAL_CONTEXT_KEY.to_string(),
                    Value::String(retrieval_context.clone()),
                );
            }
        }

        match &self.action {
            SubstepAction::Prompt {
                template,
                llm,
                refine_prompt,
                ..
            } => {
                let base = render(template, &prompt_input)?;
                let mut input_tokens = 0;
                let mut output_tokens = 0;

                let prompt = if *refine_prompt {
                    match self.refine(&base, buffer, step_id, llm).await {
                        Ok((refined, tokens)) => {
                            input_tokens += tokens.0;
                            output_tokens += tokens.1;
                            refined
                        }
                        Err(e) => {
                            tracing::warn!(
                                substep_id = self.id.as_str(),
                                error = %e,
                                "prompt refinement failed, using unrefined prompt"
                            );
                            base
                        }
                    }
                } else {
                    base
                };

                let response = llm.complete_prompt(&prompt).await?;
                let (prompt_tokens, completion_tokens) = response.token_counts();
                input_tokens += prompt_tokens;
                output_tokens += completion_tokens;

                Ok(RunOutput {
                    output: json!({"result": response.content}),
                    prompt_input,
                    prompt,
                    retrieval_context,
                    input_tokens,
                    output_tokens,
                })
            }
            SubstepAction::Transform { function, .. } => {
                let payload = Value::Object(prompt_input.clone());
                let output = function.call(&payload).await?;
                Ok(RunOutput {
                    output,
                    prompt_input,
                    prompt: String::new(),
                    retrieval_context,
                    input_tokens: 0,
                    output_tokens: 0,
                })
            }
        }
    }

    /// Prior buffer entries whose `result` is similar enough to the current
    /// `input_data`, as `(substep_id, result_text)` in buffer key order.
    async fn relevant_past_outputs(
        &self,
        input: &Map<String, Value>,
        buffer: &MemoryBuffer,
    ) -> Result<Vec<(String, String)>, SubstepError> {
        if !self.use_past_outputs {
            return Ok(Vec::new());
        }
        let Some(embedder) = self.embedder() else {
            return Ok(Vec::new());
        };

        let candidates: Vec<(String, String)> = buffer
            .iter()
            .filter(|(id, _)| id.as_str() != self.id)
            .filter_map(|(id, value)| value.get("result").map(|r| (id.clone(), value_as_text(r))))
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query = input
            .get(INPUT_DATA_KEY)
            .or_else(|| buffer.input_data())
            .map(value_as_text)
            .unwrap_or_default();

        let mut texts = Vec::with_capacity(candidates.len() + 1);
        texts.push(query);
        texts.extend(candidates.iter().map(|(_, text)| text.clone()));

        let vectors = embedder.embed(&texts).await.map_err(SubstepError::Embedding)?;
        if vectors.len() != texts.len() {
            return Err(SubstepError::Embedding(LlmError::Deserialization(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            ))));
        }

        let query_vector = &vectors[0];
        Ok(candidates
            .into_iter()
            .zip(vectors[1..].iter())
            .filter(|(_, vector)| {
                f64::from(cosine_similarity(query_vector, vector)) >= self.relevance_threshold
            })
            .map(|(candidate, _)| candidate)
            .collect())
    }

    /// Append keywords from the run so far and ask the model to tighten the prompt.
    async fn refine(
        &self,
        base: &str,
        buffer: &MemoryBuffer,
        step_id: &str,
        llm: &BoxLlmProvider,
    ) -> Result<(String, (u32, u32)), SubstepError> {
        let mut keywords: Vec<String> = Vec::new();
        let mut add = |text: &str| {
            for word in extract_keywords(text) {
                if !keywords.contains(&word) {
                    keywords.push(word);
                }
            }
        };
        if let Some(input_data) = buffer.input_data() {
            add(&value_as_text(input_data));
        }
        for (id, value) in buffer.iter() {
            if id.starts_with(step_id) {
                if let Some(result) = value.get("result") {
                    add(&value_as_text(result));
                }
            }
        }

        let enhanced = format!("{base}\nRelevant keywords: {}", keywords.join(", "));
        let mut vars = Map::new();
        vars.insert("goal".into(), Value::String(self.criteria.goal_or_empty().to_string()));
        vars.insert("prompt".into(), Value::String(enhanced));
        let refine_prompt = render(REFINE_TEMPLATE, &vars)?;

        let response = llm.complete_prompt(&refine_prompt).await?;
        let tokens = response.token_counts();
        Ok((response.content, tokens))
    }
}

/// Lowercase words longer than three characters, minus a few stopwords,
/// capped at five per text.
pub fn extract_keywords(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| word.chars().count() > 3 && !KEYWORD_STOPWORDS.contains(word))
        .take(KEYWORDS_PER_SOURCE)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::embedder::Embedder;
    use crate::repository::state::StateStore;
    use crate::retrieval::embedding_index::EmbeddingIndex;
    use crate::testing::{KeywordEmbedder, MemoryStore, ScriptedProvider};
    use crate::workflow::transform::sync_transform;

    fn input(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn upper() -> Arc<dyn Transform> {
        sync_transform(|input| {
            let text = input["input_data"].as_str().unwrap_or_default().to_uppercase();
            Ok(json!({"result": text}))
        })
    }

    #[tokio::test]
    async fn test_transform_substep_writes_buffer_and_log() {
        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        let mut buffer = MemoryBuffer::new();
        let substep = Substep::transform("upper", "uppercase", upper());

        let outcome = substep
            .execute(&input(json!({"input_data": "hello"})), &mut buffer, "s1", &telemetry)
            .await;

        assert_eq!(outcome.output, json!({"result": "HELLO"}));
        assert!(outcome.metrics.success_status);
        assert_eq!(outcome.metrics.input_tokens, 0);
        assert_eq!(buffer.get("upper"), Some(&json!({"result": "HELLO"})));

        let logs = store.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].step_id, "s1");
        assert_eq!(logs[0].substep_id, "upper");
        assert_eq!(logs[0].prompt, "");
    }

    #[tokio::test]
    async fn test_prompt_substep_renders_and_counts_tokens() {
        let provider = ScriptedProvider::replying(["positive sentiment"]).with_usage(12, 3);
        let prompts = provider.prompts();
        let llm = Arc::new(BoxLlmProvider::new(provider));
        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        let mut buffer = MemoryBuffer::new();
        let substep = Substep::prompt("classify", "Classify: {input_data}", llm)
            .with_criteria(SuccessCriteria::default().with_keywords(["sentiment"]));

        let outcome = substep
            .execute(&input(json!({"input_data": "great day"})), &mut buffer, "s1", &telemetry)
            .await;

        assert_eq!(outcome.output, json!({"result": "positive sentiment"}));
        assert!(outcome.metrics.success_status);
        assert_eq!(outcome.metrics.input_tokens, 12);
        assert_eq!(outcome.metrics.output_tokens, 3);
        assert_eq!(prompts.lock().unwrap().as_slice(), ["Classify: great day"]);
        assert_eq!(store.logs()[0].prompt, "Classify: great day");
    }

    #[tokio::test]
    async fn test_prompt_sees_buffer_entries() {
        let provider = ScriptedProvider::replying(["ok"]);
        let prompts = provider.prompts();
        let llm = Arc::new(BoxLlmProvider::new(provider));
        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        let mut buffer = MemoryBuffer::new();
        buffer.insert("upper", json!({"result": "HELLO"}));

        let substep = Substep::prompt("summary", "Prior: {upper}", llm);
        substep
            .execute(&input(json!({})), &mut buffer, "s1", &telemetry)
            .await;

        assert_eq!(
            prompts.lock().unwrap().as_slice(),
            [r#"Prior: {"result":"HELLO"}"#]
        );
    }

    #[tokio::test]
    async fn test_provider_error_becomes_failed_outcome() {
        let llm = Arc::new(BoxLlmProvider::new(ScriptedProvider::failing("timeout")));
        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        let mut buffer = MemoryBuffer::new();
        let substep = Substep::prompt("classify", "Classify: {input_data}", llm);

        let outcome = substep
            .execute(&input(json!({"input_data": "x"})), &mut buffer, "s1", &telemetry)
            .await;

        assert!(!outcome.metrics.success_status);
        assert_eq!(outcome.metrics.quality_score, 0.0);
        assert_eq!(outcome.metrics.latency, 0.0);
        assert!(outcome.output["error"].as_str().unwrap().contains("timeout"));
        assert!(
            outcome
                .metrics
                .evaluation_explanation
                .starts_with("Execution failed: ")
        );
        assert!(buffer.is_empty());
        assert_eq!(store.logs().len(), 1);
        assert!(!store.logs()[0].success_status);
    }

    #[tokio::test]
    async fn test_missing_template_variable_fails() {
        let llm = Arc::new(BoxLlmProvider::new(ScriptedProvider::replying(["never"])));
        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        let mut buffer = MemoryBuffer::new();
        let substep = Substep::prompt("p", "Needs {nothing}", llm);

        let outcome = substep
            .execute(&input(json!({})), &mut buffer, "s1", &telemetry)
            .await;
        assert!(!outcome.metrics.success_status);
        assert!(outcome.output["error"].as_str().unwrap().contains("nothing"));
    }

    #[tokio::test]
    async fn test_transform_error_becomes_failed_outcome() {
        let failing = sync_transform(|_| Err(TransformError::Failed("bad input".into())));
        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        let mut buffer = MemoryBuffer::new();
        let substep = Substep::transform("t", "failing", failing);

        let outcome = substep
            .execute(&input(json!({})), &mut buffer, "s1", &telemetry)
            .await;
        assert_eq!(outcome.output, json!({"error": "transform failed: bad input"}));
        assert_eq!(
            outcome.metrics.evaluation_explanation,
            "Execution failed: transform failed: bad input"
        );
    }

    #[tokio::test]
    async fn test_refinement_replaces_prompt() {
        let provider = ScriptedProvider::replying(["Refined prompt", "answer"]);
        let prompts = provider.prompts();
        let llm = Arc::new(BoxLlmProvider::new(provider));
        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        let mut buffer = MemoryBuffer::new();
        buffer.seed_input(json!("Customers love the product quality"));
        let substep = Substep::prompt("p", "Analyze: {input_data}", llm)
            .with_criteria(SuccessCriteria::default().with_judge("{output}", "find sentiment"))
            .with_refinement();

        substep
            .execute(&input(json!({})), &mut buffer, "s1", &telemetry)
            .await;

        let prompts = prompts.lock().unwrap().clone();
        assert!(prompts[0].starts_with("Refine this prompt"));
        assert!(prompts[0].contains("'find sentiment'"));
        assert!(prompts[0].contains(
            "Relevant keywords: customers, love, product, quality"
        ));
        assert_eq!(prompts[1], "Refined prompt");
        assert_eq!(store.logs()[0].prompt, "Refined prompt");
    }

    #[tokio::test]
    async fn test_refinement_failure_keeps_base_prompt() {
        struct FailFirst {
            calls: std::sync::atomic::AtomicUsize,
            prompts: Arc<std::sync::Mutex<Vec<String>>>,
        }

        impl crate::llm::provider::LlmProvider for FailFirst {
            fn name(&self) -> &str {
                "fail-first"
            }

            async fn complete(
                &self,
                request: &smartflow_types::llm::CompletionRequest,
            ) -> Result<smartflow_types::llm::CompletionResponse, LlmError> {
                self.prompts
                    .lock()
                    .unwrap()
                    .push(request.messages[0].content.clone());
                let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n == 0 {
                    return Err(LlmError::Timeout);
                }
                Ok(smartflow_types::llm::CompletionResponse {
                    content: "done".to_string(),
                    model: "m".to_string(),
                    usage: None,
                })
            }
        }

        let prompts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let llm = Arc::new(BoxLlmProvider::new(FailFirst {
            calls: Default::default(),
            prompts: Arc::clone(&prompts),
        }));
        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        let mut buffer = MemoryBuffer::new();
        let substep = Substep::prompt("p", "Base {input_data}", llm).with_refinement();

        let outcome = substep
            .execute(&input(json!({"input_data": "x"})), &mut buffer, "s1", &telemetry)
            .await;

        assert!(outcome.metrics.success_status);
        assert_eq!(outcome.output, json!({"result": "done"}));
        assert_eq!(prompts.lock().unwrap()[1], "Base x");
    }

    #[tokio::test]
    async fn test_rag_merges_retrieval_context() {
        let embedder = Arc::new(BoxEmbedder::new(KeywordEmbedder::new(&["cat", "dog"])));
        let index = EmbeddingIndex::build(
            Arc::clone(&embedder),
            vec![
                "dogs are loyal".to_string(),
                "cats purr".to_string(),
            ],
        )
        .await
        .unwrap();

        let transform = sync_transform(|input| {
            Ok(json!({"result": input["retrieval_context"].clone()}))
        });
        let substep = Substep::transform("lookup", "echo_context", transform).with_rag();
        assert!(substep.attach_index(Arc::new(BoxRetrievalIndex::new(index))));
        assert!(substep.has_index());

        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        let mut buffer = MemoryBuffer::new();
        let outcome = substep
            .execute(&input(json!({"input_data": "cat"})), &mut buffer, "s1", &telemetry)
            .await;

        let context = outcome.output["result"].as_str().unwrap();
        assert!(context.starts_with("cats purr"));
        assert_eq!(context.lines().count(), 2);
        assert_eq!(store.logs()[0].retrieval_context, context);
    }

    #[tokio::test]
    async fn test_attach_index_only_once() {
        struct Empty;
        impl crate::retrieval::index::RetrievalIndex for Empty {
            async fn search(&self, _q: &str, _k: usize) -> Result<Vec<String>, RetrievalError> {
                Ok(Vec::new())
            }
            fn len(&self) -> usize {
                0
            }
        }
        let substep = Substep::transform("t", "x", upper()).with_rag();
        assert!(substep.attach_index(Arc::new(BoxRetrievalIndex::new(Empty))));
        assert!(!substep.attach_index(Arc::new(BoxRetrievalIndex::new(Empty))));
    }

    #[tokio::test]
    async fn test_past_outputs_filtered_by_similarity() {
        let provider = ScriptedProvider::replying(["ok"]);
        let prompts = provider.prompts();
        let llm = Arc::new(BoxLlmProvider::new(provider));
        let embedder = Arc::new(BoxEmbedder::new(KeywordEmbedder::new(&["weather", "stock"])));
        let substep = Substep::prompt("answer", "Q: {input_data} | {forecast}", llm)
            .with_embedder(embedder)
            .with_past_outputs(0.9);

        let mut buffer = MemoryBuffer::new();
        buffer.insert("forecast", json!({"result": "weather is sunny"}));
        buffer.insert("market", json!({"result": "stock prices fell"}));
        buffer.insert("answer", json!({"result": "weather old answer"}));

        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        substep
            .execute(
                &input(json!({"input_data": "what is the weather"})),
                &mut buffer,
                "s1",
                &telemetry,
            )
            .await;

        // The relevant past output replaces the raw buffer entry with its text.
        assert_eq!(
            prompts.lock().unwrap().as_slice(),
            ["Q: what is the weather | weather is sunny"]
        );
        let logged = &store.logs()[0].input_data;
        assert_eq!(logged["forecast"], "weather is sunny");
        assert_eq!(logged["market"], json!({"result": "stock prices fell"}));
    }

    #[tokio::test]
    async fn test_past_output_at_threshold_is_included() {
        let provider = ScriptedProvider::replying(["ok"]);
        let prompts = provider.prompts();
        let llm = Arc::new(BoxLlmProvider::new(provider));
        let embedder = Arc::new(BoxEmbedder::new(KeywordEmbedder::new(&["weather", "sunny"])));
        // Identical keyword vectors score exactly 1.0.
        let substep = Substep::prompt("answer", "{report}", llm)
            .with_embedder(embedder)
            .with_past_outputs(1.0);

        let mut buffer = MemoryBuffer::new();
        buffer.insert("report", json!({"result": "weather report"}));
        buffer.insert("forecast", json!({"result": "weather is sunny"}));

        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        substep
            .execute(
                &input(json!({"input_data": "what is the weather"})),
                &mut buffer,
                "s1",
                &telemetry,
            )
            .await;

        assert_eq!(prompts.lock().unwrap().as_slice(), ["weather report"]);
        let logged = &store.logs()[0].input_data;
        assert_eq!(logged["report"], "weather report");
        assert_eq!(logged["forecast"], json!({"result": "weather is sunny"}));
    }

    #[tokio::test]
    async fn test_past_outputs_skipped_without_embedder() {
        struct Panicky;
        impl Embedder for Panicky {
            async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
                Err(LlmError::Timeout)
            }
            fn model_name(&self) -> &str {
                "panicky"
            }
        }

        // Transform substeps never carry an embedder.
        let substep = Substep::transform("t", "upper", upper())
            .with_embedder(Arc::new(BoxEmbedder::new(Panicky)))
            .with_past_outputs(0.1);
        let mut buffer = MemoryBuffer::new();
        buffer.insert("a", json!({"result": "x"}));
        let store = MemoryStore::new();
        let telemetry = TelemetryRecorder::new(&store, "wf");
        let outcome = substep
            .execute(&input(json!({"input_data": "y"})), &mut buffer, "s1", &telemetry)
            .await;
        assert!(outcome.metrics.success_status);
        assert_eq!(store.get_logs("wf").await.unwrap().len(), 1);
    }

    #[test]
    fn test_extract_keywords() {
        assert_eq!(
            extract_keywords("This is a test with some longer words from here and there"),
            vec!["test", "some", "longer", "words", "here"]
        );
        assert!(extract_keywords("a an the").is_empty());
    }
}
