//! Inference provider abstractions and implementations.
//!
//! The handler talks to a model through [`InferenceProvider`], so Bedrock can
//! be swapped for the mock in local runs and tests.

pub mod bedrock;
pub mod mock;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Stable label for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::InvalidRequest(_) => "invalid_request",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::NetworkError(_) => "network_error",
        }
    }
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation turn made of text blocks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<String>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![text.into()],
        }
    }
}

/// Generation parameters for a conversation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    /// Maximum output tokens.
    pub max_tokens: i32,

    /// Sampling temperature.
    pub temperature: f32,
}

/// A conversation addressed to one model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConverseRequest {
    pub model_id: String,
    pub messages: Vec<ChatMessage>,
    pub params: GenerationParams,
}

/// Trait for conversational text generation backends (e.g., Bedrock).
///
/// The reply is returned as a JSON document in the Converse wire shape
/// (`output.message.content[*].text`). Callers navigate it leniently, so a
/// backend that returns an unexpected shape degrades to empty text instead of
/// failing the invocation.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Run one conversation and return the raw reply document.
    async fn converse(&self, request: &ConverseRequest) -> Result<Value, ProviderError>;

    /// Health check.
    async fn health_check(&self) -> Result<(), ProviderError>;
}
