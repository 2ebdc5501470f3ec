//! Global configuration types for SmartFlow.
//!
//! `GlobalConfig` represents the top-level `smartflow.toml` that selects the
//! LLM provider, the embedding provider, and the storage backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::llm::ProviderType;

/// Top-level configuration for SmartFlow.
///
/// Loaded from `~/.smartflow/smartflow.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

/// LLM provider selection.
///
/// API keys are not part of the file; they come from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_provider")]
    pub provider: ProviderType,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// OpenAI-compatible base URL (including `/v1`).
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Ollama server root; `/v1` is appended by the client.
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_provider() -> ProviderType {
    ProviderType::OpenAi
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            openai_base_url: default_openai_base_url(),
            ollama_base_url: default_ollama_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Embedding provider selection, used for retrieval and past-output relevance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_llm_provider")]
    pub provider: ProviderType,

    #[serde(default = "default_embedding_model")]
    pub model: String,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_embedding_model(),
        }
    }
}

/// Which state/telemetry backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Sqlite,
    Json,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Sqlite => write!(f, "sqlite"),
            StorageKind::Json => write!(f, "json"),
        }
    }
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(StorageKind::Sqlite),
            "json" => Ok(StorageKind::Json),
            other => Err(format!("invalid storage type: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default, rename = "type")]
    pub kind: StorageKind,
}
