#![allow(dead_code)]

use async_trait::async_trait;
use prompt_service::config::PromptConfig;
use prompt_service::handler::PromptHandler;
use prompt_service::services::providers::ConverseRequest;
use prompt_service::services::{
    ArtifactStorage, InferenceProvider, PromptMetrics, ProviderError, StorageError,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

pub const TEST_MODEL_ID: &str = "test.model-v1";

/// One `put` call seen by [`RecordingStorage`].
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub data: Vec<u8>,
    pub content_type: String,
}

impl StoredObject {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.data).expect("artifact is not JSON")
    }
}

/// Storage double that keeps every write in memory, or fails every write.
#[derive(Default)]
pub struct RecordingStorage {
    pub writes: Mutex<Vec<StoredObject>>,
    fail: bool,
}

impl RecordingStorage {
    pub fn failing() -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn writes(&self) -> Vec<StoredObject> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStorage for RecordingStorage {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        if self.fail {
            return Err(StorageError::S3 {
                bucket: "test-bucket".to_string(),
                key: key.to_string(),
                message: "AccessDenied".to_string(),
            });
        }

        self.writes.lock().unwrap().push(StoredObject {
            key: key.to_string(),
            data,
            content_type: content_type.to_string(),
        });
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// Inference double returning a fixed reply (or fault) and recording requests.
pub struct ScriptedInference {
    reply: Result<Value, fn() -> ProviderError>,
    pub requests: Mutex<Vec<ConverseRequest>>,
}

impl ScriptedInference {
    pub fn replying(reply: Value) -> Self {
        Self {
            reply: Ok(reply),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Reply in Converse shape with a single text block.
    pub fn text(text: &str) -> Self {
        Self::replying(json!({
            "output": { "message": { "role": "assistant", "content": [{ "text": text }] } },
            "stopReason": "end_turn"
        }))
    }

    pub fn failing(fault: fn() -> ProviderError) -> Self {
        Self {
            reply: Err(fault),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ConverseRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceProvider for ScriptedInference {
    async fn converse(&self, request: &ConverseRequest) -> Result<Value, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(fault) => Err(fault()),
        }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

pub fn test_config() -> PromptConfig {
    let mut config = PromptConfig::local("target/unused-test-storage");
    config.models.model_id = TEST_MODEL_ID.to_string();
    config
}

pub fn handler_with(
    inference: Arc<ScriptedInference>,
    storage: Arc<RecordingStorage>,
) -> PromptHandler {
    PromptHandler::new(
        &test_config(),
        inference,
        storage,
        Arc::new(PromptMetrics::new().unwrap()),
    )
}
