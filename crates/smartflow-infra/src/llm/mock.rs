//! Offline provider for demos and dry runs.
//!
//! Echoes the last user message back, prefixed with the model name. Token
//! usage is approximated by whitespace word counts.

use smartflow_core::llm::provider::LlmProvider;
use smartflow_types::llm::{CompletionRequest, CompletionResponse, LlmError, MessageRole, Usage};

#[derive(Debug, Clone)]
pub struct MockProvider {
    model: String,
}

impl MockProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .ok_or_else(|| LlmError::InvalidRequest("no user message".to_string()))?;

        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };
        let content = format!("[{model}] {prompt}");

        let input_tokens = word_count(prompt)
            + request.system.as_deref().map(word_count).unwrap_or(0);
        let output_tokens = word_count(&content);

        Ok(CompletionResponse {
            content,
            model,
            usage: Some(Usage {
                input_tokens,
                output_tokens,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echoes_prompt_with_usage() {
        let provider = MockProvider::new("mock-small");
        let response = provider
            .complete(&CompletionRequest::from_prompt("classify this review"))
            .await
            .unwrap();
        assert_eq!(response.content, "[mock-small] classify this review");
        assert_eq!(response.token_counts(), (3, 4));
    }

    #[tokio::test]
    async fn test_no_user_message_is_invalid() {
        let provider = MockProvider::new("m");
        let request = CompletionRequest {
            messages: Vec::new(),
            ..CompletionRequest::from_prompt("")
        };
        let err = provider.complete(&request).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }
}
