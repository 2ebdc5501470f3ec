//! Embedding backends.
//!
//! [`create_embedder`] picks a backend from [`EmbeddingSettings`]. OpenAI and
//! Ollama both go through the OpenAI-compatible `/embeddings` endpoint; the
//! mock backend is a local hashing embedder.

pub mod mock;
pub mod openai_compat;

use std::time::Duration;

use smartflow_core::memory::box_embedder::BoxEmbedder;
use smartflow_types::config::{EmbeddingSettings, LlmSettings};
use smartflow_types::llm::{LlmError, ProviderType};

use crate::config::Credentials;

use self::mock::HashingEmbedder;
use self::openai_compat::OpenAiCompatEmbedder;

/// Build the configured embedder. Base URLs and timeout come from the LLM
/// settings.
pub fn create_embedder(
    settings: &EmbeddingSettings,
    llm: &LlmSettings,
    credentials: &Credentials,
) -> Result<BoxEmbedder, LlmError> {
    let timeout = Duration::from_secs(llm.timeout_secs);
    match settings.provider {
        ProviderType::OpenAi => {
            let key = credentials
                .openai_api_key
                .clone()
                .ok_or(LlmError::AuthenticationFailed)?;
            let embedder = OpenAiCompatEmbedder::new(
                llm.openai_base_url.as_str(),
                Some(key),
                settings.model.as_str(),
                timeout,
            )?;
            Ok(BoxEmbedder::new(embedder))
        }
        ProviderType::Ollama => {
            let base_url = format!("{}/v1", llm.ollama_base_url.trim_end_matches('/'));
            let embedder =
                OpenAiCompatEmbedder::new(base_url, None, settings.model.as_str(), timeout)?;
            Ok(BoxEmbedder::new(embedder))
        }
        ProviderType::Mock => Ok(BoxEmbedder::new(HashingEmbedder::default())),
    }
}
