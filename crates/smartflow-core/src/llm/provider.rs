//! LlmProvider trait definition.
//!
//! This is the core abstraction that all LLM providers implement. Latency is
//! measured by the caller, never by the provider.

use smartflow_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for LLM provider backends (OpenAI-compatible, Ollama, mock).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
/// Implementations live in smartflow-infra.
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
