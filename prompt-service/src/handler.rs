//! The request handler: resolve prompt, converse, record artifact, respond.
//!
//! Every step runs in order within one invocation. Malformed input and
//! malformed model replies degrade to defaults. Provider and storage failures
//! propagate to the hosting layer unchanged.

use crate::config::PromptConfig;
use crate::services::providers::{ChatMessage, ConverseRequest, GenerationParams};
use crate::services::metrics::{self, PromptMetrics};
use crate::services::{ArtifactStorage, InferenceProvider, ProviderError, StorageError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Prompt used whenever the event carries no usable `prompt`.
pub const DEFAULT_PROMPT: &str = "Explain what AWS Lambda does in one sentence.";

pub const MAX_OUTPUT_TOKENS: i32 = 150;
pub const TEMPERATURE: f32 = 0.2;

pub const ARTIFACT_KEY_PREFIX: &str = "artifacts/http-run-";
const ARTIFACT_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("inference failed: {0}")]
    Inference(#[from] ProviderError),

    #[error("artifact write failed: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Locate the mapping the prompt is read from.
///
/// A string `body` that is not a JSON object counts as an empty mapping; a
/// `body` of any other non-object type is ignored and the event itself is used.
fn prompt_source(event: &Value) -> Option<Cow<'_, Map<String, Value>>> {
    let from_body = match event.get("body") {
        Some(Value::String(text)) => Some(Cow::Owned(
            match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            },
        )),
        Some(Value::Object(map)) => Some(Cow::Borrowed(map)),
        _ => None,
    };

    from_body.or_else(|| event.as_object().map(Cow::Borrowed))
}

/// Resolve the prompt text for an inbound event, falling back to
/// [`DEFAULT_PROMPT`] when none is reachable.
pub fn resolve_prompt(event: &Value) -> String {
    prompt_source(event)
        .as_deref()
        .and_then(|source| source.get("prompt"))
        .and_then(Value::as_str)
        .filter(|prompt| !prompt.is_empty())
        .unwrap_or(DEFAULT_PROMPT)
        .to_string()
}

/// Concatenate `output.message.content[*].text` in order. Any missing or
/// mistyped level yields an empty string.
pub fn extract_output_text(reply: &Value) -> String {
    reply
        .get("output")
        .and_then(|output| output.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

/// Storage key for an artifact written at `now`, second precision.
pub fn artifact_key(now: DateTime<Utc>) -> String {
    format!(
        "{}{}.json",
        ARTIFACT_KEY_PREFIX,
        now.format(ARTIFACT_TIMESTAMP_FORMAT)
    )
}

/// Document persisted for every invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactRecord {
    pub model: String,
    pub prompt: String,
    pub response: String,
}

/// JSON body returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseBody {
    pub model: String,
    pub s3_key: String,
    pub output: String,
}

/// Outcome of a successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub status_code: u16,
    pub headers: Vec<(&'static str, &'static str)>,
    pub body: ResponseBody,
}

impl HandlerResponse {
    fn ok(body: ResponseBody) -> Self {
        Self {
            status_code: 200,
            headers: vec![
                ("Content-Type", JSON_CONTENT_TYPE),
                ("Access-Control-Allow-Origin", "*"),
            ],
            body,
        }
    }

    /// Proxy-integration shape: `{"statusCode", "headers", "body"}` with the
    /// body serialized to a string.
    pub fn to_proxy_value(&self) -> Result<Value, serde_json::Error> {
        let headers: Map<String, Value> = self
            .headers
            .iter()
            .map(|(name, value)| (name.to_string(), Value::from(*value)))
            .collect();

        Ok(serde_json::json!({
            "statusCode": self.status_code,
            "headers": headers,
            "body": serde_json::to_string(&self.body)?,
        }))
    }
}

/// Token counts from the reply's `usage` block, when the backend reports them.
pub fn token_usage(reply: &Value) -> Option<(u64, u64)> {
    let usage = reply.get("usage")?;
    Some((
        usage.get("inputTokens")?.as_u64()?,
        usage.get("outputTokens")?.as_u64()?,
    ))
}

/// Stateless request handler shared by every invocation of a process.
pub struct PromptHandler {
    model_id: String,
    inference: Arc<dyn InferenceProvider>,
    storage: Arc<dyn ArtifactStorage>,
    metrics: Arc<PromptMetrics>,
}

impl PromptHandler {
    pub fn new(
        config: &PromptConfig,
        inference: Arc<dyn InferenceProvider>,
        storage: Arc<dyn ArtifactStorage>,
        metrics: Arc<PromptMetrics>,
    ) -> Self {
        Self {
            model_id: config.models.model_id.clone(),
            inference,
            storage,
            metrics,
        }
    }

    pub fn inference(&self) -> &Arc<dyn InferenceProvider> {
        &self.inference
    }

    pub fn metrics(&self) -> &Arc<PromptMetrics> {
        &self.metrics
    }

    /// Conversation sent for `prompt`: one user turn, fixed parameters.
    pub fn converse_request(&self, prompt: &str) -> ConverseRequest {
        ConverseRequest {
            model_id: self.model_id.clone(),
            messages: vec![ChatMessage::user(prompt)],
            params: GenerationParams {
                max_tokens: MAX_OUTPUT_TOKENS,
                temperature: TEMPERATURE,
            },
        }
    }

    pub async fn handle(&self, event: &Value) -> Result<HandlerResponse, HandlerError> {
        self.handle_at(event, Utc::now()).await
    }

    /// Function-runtime entry: the raw payload in, the proxy-integration
    /// document out.
    pub async fn handle_proxy(&self, event: &Value) -> Result<Value, HandlerError> {
        let response = self.handle(event).await?;
        Ok(response.to_proxy_value()?)
    }

    /// Run one invocation with `now` as the artifact timestamp.
    pub async fn handle_at(
        &self,
        event: &Value,
        now: DateTime<Utc>,
    ) -> Result<HandlerResponse, HandlerError> {
        let result = self.run(event, now).await;

        let outcome = match &result {
            Ok(_) => metrics::OUTCOME_SUCCESS,
            Err(HandlerError::Inference(_)) => metrics::OUTCOME_INFERENCE_ERROR,
            Err(HandlerError::Storage(_)) => metrics::OUTCOME_STORAGE_ERROR,
            Err(HandlerError::Serialization(_)) => metrics::OUTCOME_SERIALIZATION_ERROR,
        };
        self.metrics.record_invocation(outcome);

        result
    }

    async fn run(&self, event: &Value, now: DateTime<Utc>) -> Result<HandlerResponse, HandlerError> {
        let prompt = resolve_prompt(event);
        tracing::info!(
            model = %self.model_id,
            prompt_len = prompt.len(),
            "Handling prompt invocation"
        );

        let started = Instant::now();
        let reply = self
            .inference
            .converse(&self.converse_request(&prompt))
            .await;
        self.metrics
            .record_inference_latency(&self.model_id, started.elapsed().as_secs_f64());

        let reply = reply.map_err(|e| {
            tracing::error!(model = %self.model_id, error = %e, "Inference call failed");
            self.metrics
                .record_inference_error(&self.model_id, e.error_type());
            e
        })?;

        if let Some((input_tokens, output_tokens)) = token_usage(&reply) {
            self.metrics
                .record_tokens(&self.model_id, input_tokens, output_tokens);
        }

        let output = extract_output_text(&reply);
        if output.is_empty() {
            tracing::warn!(model = %self.model_id, "Inference reply contained no text");
            self.metrics.record_empty_output(&self.model_id);
        }

        let key = artifact_key(now);
        let record = ArtifactRecord {
            model: self.model_id.clone(),
            prompt,
            response: output.clone(),
        };
        let payload = serde_json::to_vec(&record)?;

        self.storage
            .put(&key, payload, JSON_CONTENT_TYPE)
            .await
            .map_err(|e| {
                tracing::error!(
                    key = %key,
                    location = %self.storage.location(),
                    error = %e,
                    "Artifact write failed"
                );
                self.metrics.record_artifact_write_error();
                e
            })?;

        tracing::info!(
            key = %key,
            location = %self.storage.location(),
            output_len = output.len(),
            "Artifact stored"
        );

        Ok(HandlerResponse::ok(ResponseBody {
            model: self.model_id.clone(),
            s3_key: key,
            output,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, TimeZone};
    use serde_json::json;

    #[test]
    fn prompt_at_top_level() {
        assert_eq!(resolve_prompt(&json!({"prompt": "hi"})), "hi");
    }

    #[test]
    fn prompt_in_string_body() {
        let event = json!({"body": "{\"prompt\": \"from string\"}"});
        assert_eq!(resolve_prompt(&event), "from string");
    }

    #[test]
    fn prompt_in_object_body() {
        let event = json!({"body": {"prompt": "from object"}});
        assert_eq!(resolve_prompt(&event), "from object");
    }

    #[test]
    fn body_wins_over_top_level_prompt() {
        let event = json!({"prompt": "outer", "body": {"prompt": "inner"}});
        assert_eq!(resolve_prompt(&event), "inner");
    }

    #[test]
    fn unparseable_string_body_uses_default() {
        let event = json!({"body": "not json", "prompt": "ignored"});
        assert_eq!(resolve_prompt(&event), DEFAULT_PROMPT);
    }

    #[test]
    fn string_body_with_non_object_json_uses_default() {
        assert_eq!(resolve_prompt(&json!({"body": "[1, 2]"})), DEFAULT_PROMPT);
        assert_eq!(resolve_prompt(&json!({"body": "\"hi\""})), DEFAULT_PROMPT);
    }

    #[test]
    fn numeric_body_falls_back_to_event() {
        assert_eq!(resolve_prompt(&json!({"body": 42})), DEFAULT_PROMPT);
        assert_eq!(
            resolve_prompt(&json!({"body": 42, "prompt": "outer"})),
            "outer"
        );
    }

    #[test]
    fn null_body_falls_back_to_event() {
        assert_eq!(
            resolve_prompt(&json!({"body": null, "prompt": "outer"})),
            "outer"
        );
    }

    #[test]
    fn missing_or_empty_prompt_uses_default() {
        assert_eq!(resolve_prompt(&json!({})), DEFAULT_PROMPT);
        assert_eq!(resolve_prompt(&json!({"prompt": ""})), DEFAULT_PROMPT);
        assert_eq!(resolve_prompt(&json!({"prompt": 7})), DEFAULT_PROMPT);
        assert_eq!(resolve_prompt(&json!({"body": ""})), DEFAULT_PROMPT);
    }

    #[test]
    fn non_mapping_event_uses_default() {
        assert_eq!(resolve_prompt(&json!("prompt")), DEFAULT_PROMPT);
        assert_eq!(resolve_prompt(&json!([{"prompt": "x"}])), DEFAULT_PROMPT);
        assert_eq!(resolve_prompt(&Value::Null), DEFAULT_PROMPT);
    }

    #[test]
    fn output_concatenates_text_in_order() {
        let reply = json!({"output": {"message": {"content": [{"text": "a"}, {"text": "b"}]}}});
        assert_eq!(extract_output_text(&reply), "ab");
    }

    #[test]
    fn output_skips_blocks_without_text() {
        let reply = json!({"output": {"message": {"content": [
            {"text": "a"}, {"image": {}}, {"text": 5}, {"text": "c"}
        ]}}});
        assert_eq!(extract_output_text(&reply), "ac");
    }

    #[test]
    fn output_missing_at_any_level_is_empty() {
        for reply in [
            json!(null),
            json!({}),
            json!({"output": null}),
            json!({"output": {}}),
            json!({"output": {"message": "text"}}),
            json!({"output": {"message": {}}}),
            json!({"output": {"message": {"content": {}}}}),
            json!({"output": {"message": {"content": []}}}),
        ] {
            assert_eq!(extract_output_text(&reply), "", "reply: {reply}");
        }
    }

    #[test]
    fn token_usage_reads_usage_block() {
        let reply = json!({"usage": {"inputTokens": 12, "outputTokens": 7}});
        assert_eq!(token_usage(&reply), Some((12, 7)));
        assert_eq!(token_usage(&json!({"usage": {"inputTokens": 12}})), None);
        assert_eq!(token_usage(&json!({})), None);
    }

    #[test]
    fn artifact_key_uses_second_precision_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(artifact_key(now), "artifacts/http-run-20240309-070501.json");
    }

    #[test]
    fn artifact_key_for_current_time_matches_pattern() {
        let key = artifact_key(Utc::now());
        let stamp = key
            .strip_prefix(ARTIFACT_KEY_PREFIX)
            .and_then(|rest| rest.strip_suffix(".json"))
            .unwrap();

        assert_eq!(stamp.len(), 15);
        assert!(NaiveDateTime::parse_from_str(stamp, ARTIFACT_TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn proxy_value_serializes_body_as_string() {
        let response = HandlerResponse::ok(ResponseBody {
            model: "m".into(),
            s3_key: "k".into(),
            output: "o".into(),
        });
        let value = response.to_proxy_value().unwrap();

        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["headers"]["Content-Type"], "application/json");
        assert_eq!(value["headers"]["Access-Control-Allow-Origin"], "*");
        let body: Value = serde_json::from_str(value["body"].as_str().unwrap()).unwrap();
        assert_eq!(body, json!({"model": "m", "s3_key": "k", "output": "o"}));
    }
}
