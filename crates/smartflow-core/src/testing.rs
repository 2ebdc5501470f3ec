//! In-test doubles for the core ports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use smartflow_types::error::RepositoryError;
use smartflow_types::llm::{CompletionRequest, CompletionResponse, LlmError, Usage};
use smartflow_types::state::{StateSnapshot, StepLogEntry};

use crate::llm::provider::LlmProvider;
use crate::memory::embedder::Embedder;
use crate::repository::state::StateStore;

// ---------------------------------------------------------------------------
// ScriptedProvider
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Reply {
    Text(String),
    Error(String),
}

/// Replays a fixed list of replies; the last one repeats once exhausted.
pub struct ScriptedProvider {
    replies: Vec<Reply>,
    cursor: AtomicUsize,
    prompts: Arc<Mutex<Vec<String>>>,
    usage: Option<Usage>,
}

impl ScriptedProvider {
    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(|r| Reply::Text(r.into())).collect(),
            cursor: AtomicUsize::new(0),
            prompts: Arc::new(Mutex::new(Vec::new())),
            usage: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            replies: vec![Reply::Error(message.to_string())],
            ..Self::replying(Vec::<String>::new())
        }
    }

    pub fn with_usage(mut self, input_tokens: u32, output_tokens: u32) -> Self {
        self.usage = Some(Usage {
            input_tokens,
            output_tokens,
        });
        self
    }

    /// Shared handle to every prompt received, in call order.
    pub fn prompts(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.prompts)
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt);

        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .get(index.min(self.replies.len().saturating_sub(1)))
            .cloned()
            .unwrap_or(Reply::Text(String::new()));

        match reply {
            Reply::Text(content) => Ok(CompletionResponse {
                content,
                model: "scripted-model".to_string(),
                usage: self.usage.clone(),
            }),
            Reply::Error(message) => Err(LlmError::Provider { message }),
        }
    }
}

// ---------------------------------------------------------------------------
// KeywordEmbedder
// ---------------------------------------------------------------------------

/// Embeds text as presence flags over a fixed vocabulary.
pub struct KeywordEmbedder {
    vocabulary: Vec<String>,
}

impl KeywordEmbedder {
    pub fn new(vocabulary: &[&str]) -> Self {
        Self {
            vocabulary: vocabulary.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts
            .iter()
            .map(|t| {
                let t = t.to_lowercase();
                self.vocabulary
                    .iter()
                    .map(|w| if t.contains(w.as_str()) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory [`StateStore`]. Clones share the same underlying data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    states: Arc<Mutex<HashMap<String, (StateSnapshot, i64)>>>,
    logs: Arc<Mutex<Vec<StepLogEntry>>>,
    failing_saves: Arc<AtomicUsize>,
    save_calls: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` `save_state` calls fail.
    pub fn fail_next_saves(&self, n: usize) {
        self.failing_saves.store(n, Ordering::SeqCst);
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn logs(&self) -> Vec<StepLogEntry> {
        self.logs.lock().unwrap().clone()
    }
}

impl StateStore for MemoryStore {
    async fn save_state(
        &self,
        workflow_id: &str,
        state: &StateSnapshot,
        version: i64,
    ) -> Result<(), RepositoryError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.failing_saves.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_saves.store(pending - 1, Ordering::SeqCst);
            return Err(RepositoryError::Io("disk full".to_string()));
        }
        self.states
            .lock()
            .unwrap()
            .insert(workflow_id.to_string(), (state.clone(), version));
        Ok(())
    }

    async fn load_state(&self, workflow_id: &str) -> Result<StateSnapshot, RepositoryError> {
        Ok(self
            .states
            .lock()
            .unwrap()
            .get(workflow_id)
            .map(|(s, _)| s.clone())
            .unwrap_or_default())
    }

    async fn load_version(&self, workflow_id: &str) -> Result<Option<i64>, RepositoryError> {
        Ok(self.states.lock().unwrap().get(workflow_id).map(|(_, v)| *v))
    }

    async fn log_step(&self, entry: &StepLogEntry) -> Result<(), RepositoryError> {
        self.logs.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn get_logs(&self, workflow_id: &str) -> Result<Vec<StepLogEntry>, RepositoryError> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn list_workflows(&self) -> Result<Vec<String>, RepositoryError> {
        let mut ids: Vec<String> = self.states.lock().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
