//! Mock provider implementation for local runs and testing.

use super::{ConverseRequest, InferenceProvider, ProviderError, Role};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Mock provider answering every conversation with a canned echo.
pub struct MockInferenceProvider {
    enabled: bool,
}

impl MockInferenceProvider {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl InferenceProvider for MockInferenceProvider {
    async fn converse(&self, request: &ConverseRequest) -> Result<Value, ProviderError> {
        if !self.enabled {
            return Err(ProviderError::NotConfigured(
                "Mock inference provider not enabled".to_string(),
            ));
        }

        let prompt = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.concat())
            .unwrap_or_default();

        Ok(json!({
            "output": {
                "message": {
                    "role": "assistant",
                    "content": [{ "text": format!("Mock response for: {}", prompt) }]
                }
            },
            "stopReason": "end_turn",
            "usage": {
                "inputTokens": prompt.len() / 4,
                "outputTokens": 10
            }
        }))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.enabled {
            Ok(())
        } else {
            Err(ProviderError::NotConfigured(
                "Mock inference provider not enabled".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::{ChatMessage, GenerationParams};

    fn request(prompt: &str) -> ConverseRequest {
        ConverseRequest {
            model_id: "mock-model".to_string(),
            messages: vec![ChatMessage::user(prompt)],
            params: GenerationParams {
                max_tokens: 150,
                temperature: 0.2,
            },
        }
    }

    #[tokio::test]
    async fn echoes_user_prompt() {
        let reply = MockInferenceProvider::new(true)
            .converse(&request("ping"))
            .await
            .unwrap();
        assert_eq!(
            reply["output"]["message"]["content"][0]["text"],
            "Mock response for: ping"
        );
    }

    #[tokio::test]
    async fn disabled_mock_fails() {
        let provider = MockInferenceProvider::new(false);
        assert!(matches!(
            provider.converse(&request("ping")).await,
            Err(ProviderError::NotConfigured(_))
        ));
        assert!(provider.health_check().await.is_err());
    }
}
