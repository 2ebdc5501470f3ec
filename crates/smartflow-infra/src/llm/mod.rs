//! LLM provider implementations.
//!
//! Concrete [`LlmProvider`](smartflow_core::llm::provider::LlmProvider)
//! backends plus a factory ([`create_provider`]) that picks one from
//! [`LlmSettings`] and a connection check ([`test_provider_connection`]).

pub mod mock;
pub mod openai_compat;

use std::time::Duration;

use smartflow_core::llm::box_provider::BoxLlmProvider;
use smartflow_types::config::LlmSettings;
use smartflow_types::llm::{CompletionRequest, LlmError, ProviderType};

use crate::config::Credentials;

use self::mock::MockProvider;
use self::openai_compat::OpenAiCompatProvider;

/// Create a [`BoxLlmProvider`] from settings.
///
/// `model` overrides `settings.model` for substeps that pin their own model.
///
/// # Errors
///
/// `AuthenticationFailed` when the OpenAI backend is selected without an API
/// key; `Provider` when the HTTP client cannot be built.
pub fn create_provider(
    settings: &LlmSettings,
    model: Option<&str>,
    credentials: &Credentials,
) -> Result<BoxLlmProvider, LlmError> {
    let model = model.unwrap_or(&settings.model);
    let timeout = Duration::from_secs(settings.timeout_secs);

    match settings.provider {
        ProviderType::OpenAi => {
            let key = credentials
                .openai_api_key
                .clone()
                .ok_or(LlmError::AuthenticationFailed)?;
            let provider = OpenAiCompatProvider::new(
                "openai",
                settings.openai_base_url.as_str(),
                Some(key),
                model,
                timeout,
            )?;
            Ok(BoxLlmProvider::new(provider))
        }
        ProviderType::Ollama => {
            let base_url = format!("{}/v1", settings.ollama_base_url.trim_end_matches('/'));
            let provider = OpenAiCompatProvider::new("ollama", base_url, None, model, timeout)?;
            Ok(BoxLlmProvider::new(provider))
        }
        ProviderType::Mock => Ok(BoxLlmProvider::new(MockProvider::new(model))),
    }
}

/// Send a minimal completion to verify the provider is reachable.
pub async fn test_provider_connection(provider: &BoxLlmProvider) -> Result<(), LlmError> {
    let request = CompletionRequest {
        max_tokens: Some(5),
        temperature: Some(0.0),
        ..CompletionRequest::from_prompt("Hello")
    };
    provider.complete(&request).await?;
    Ok(())
}
