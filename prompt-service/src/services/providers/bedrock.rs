//! Amazon Bedrock provider implementation.
//!
//! Uses the model-agnostic Converse API, so any chat model enabled in the
//! account can be addressed by id without changing the request body.

use super::{ChatMessage, ConverseRequest, InferenceProvider, ProviderError, Role};
use async_trait::async_trait;
use aws_sdk_bedrockruntime::config::http::HttpResponse;
use aws_sdk_bedrockruntime::error::{DisplayErrorContext, SdkError};
use aws_sdk_bedrockruntime::operation::converse::ConverseError;
use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, InferenceConfiguration, Message,
};
use aws_sdk_bedrockruntime::Client;
use serde_json::{json, Value};

/// Bedrock conversational provider.
pub struct BedrockProvider {
    client: Client,
}

impl BedrockProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a provider from a loaded SDK configuration.
    pub fn from_conf(sdk_config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(sdk_config))
    }
}

fn to_sdk_message(message: &ChatMessage) -> Result<Message, ProviderError> {
    let role = match message.role {
        Role::User => ConversationRole::User,
        Role::Assistant => ConversationRole::Assistant,
    };

    message
        .content
        .iter()
        .fold(Message::builder().role(role), |builder, text| {
            builder.content(ContentBlock::Text(text.clone()))
        })
        .build()
        .map_err(|e| ProviderError::InvalidRequest(e.to_string()))
}

/// Render a Converse reply as the JSON document handed back to callers.
///
/// Non-text content blocks become empty objects so their position in the
/// list is preserved but they contribute no text.
fn reply_document(message: Option<&Message>, stop_reason: &str, usage: Option<(i32, i32)>) -> Value {
    let mut document = json!({ "stopReason": stop_reason });

    if let Some(message) = message {
        let content: Vec<Value> = message
            .content()
            .iter()
            .map(|block| match block.as_text() {
                Ok(text) => json!({ "text": text }),
                Err(_) => json!({}),
            })
            .collect();

        document["output"] = json!({
            "message": {
                "role": message.role().as_str(),
                "content": content,
            }
        });
    }

    if let Some((input_tokens, output_tokens)) = usage {
        document["usage"] = json!({
            "inputTokens": input_tokens,
            "outputTokens": output_tokens,
        });
    }

    document
}

fn classify_error(err: SdkError<ConverseError, HttpResponse>) -> ProviderError {
    if matches!(err, SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)) {
        return ProviderError::NetworkError(DisplayErrorContext(&err).to_string());
    }

    match err.into_service_error() {
        ConverseError::ThrottlingException(_) => ProviderError::RateLimited,
        ConverseError::ValidationException(e) => ProviderError::InvalidRequest(e.to_string()),
        ConverseError::ResourceNotFoundException(e) => {
            ProviderError::InvalidRequest(e.to_string())
        }
        other => ProviderError::ApiError(DisplayErrorContext(&other).to_string()),
    }
}

#[async_trait]
impl InferenceProvider for BedrockProvider {
    async fn converse(&self, request: &ConverseRequest) -> Result<Value, ProviderError> {
        let messages = request
            .messages
            .iter()
            .map(to_sdk_message)
            .collect::<Result<Vec<_>, _>>()?;

        let inference_config = InferenceConfiguration::builder()
            .max_tokens(request.params.max_tokens)
            .temperature(request.params.temperature)
            .build();

        tracing::debug!(
            model = %request.model_id,
            message_count = messages.len(),
            max_tokens = request.params.max_tokens,
            temperature = request.params.temperature,
            "Sending Converse request to Bedrock"
        );

        let output = self
            .client
            .converse()
            .model_id(&request.model_id)
            .set_messages(Some(messages))
            .inference_config(inference_config)
            .send()
            .await
            .map_err(classify_error)?;

        let message = output.output().and_then(|o| o.as_message().ok());
        let usage = output
            .usage()
            .map(|u| (u.input_tokens(), u.output_tokens()));

        tracing::debug!(
            model = %request.model_id,
            stop_reason = output.stop_reason().as_str(),
            input_tokens = usage.map(|u| u.0),
            output_tokens = usage.map(|u| u.1),
            "Bedrock Converse call completed"
        );

        Ok(reply_document(message, output.stop_reason().as_str(), usage))
    }

    /// Reports healthy whenever the client has a region. Converse has no
    /// side-effect free call, so credentials and model access are not checked.
    async fn health_check(&self) -> Result<(), ProviderError> {
        match self.client.config().region() {
            Some(_) => Ok(()),
            None => Err(ProviderError::NotConfigured(
                "Bedrock client has no region".to_string(),
            )),
        }
    }
}
