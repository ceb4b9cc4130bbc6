//! Prometheus metrics for prompt-service.
//!
//! The registry is owned by the handler rather than a process global, so each
//! handler scrapes only its own counters.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Invocation outcome label values.
pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_INFERENCE_ERROR: &str = "inference_error";
pub const OUTCOME_STORAGE_ERROR: &str = "storage_error";
pub const OUTCOME_SERIALIZATION_ERROR: &str = "serialization_error";

pub struct PromptMetrics {
    registry: Registry,
    invocations_total: IntCounterVec,
    inference_latency_seconds: HistogramVec,
    inference_errors_total: IntCounterVec,
    tokens_total: IntCounterVec,
    empty_outputs_total: IntCounterVec,
    artifact_write_errors_total: IntCounter,
}

impl PromptMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let invocations_total = IntCounterVec::new(
            Opts::new("prompt_invocations_total", "Total prompt invocations"),
            &["outcome"],
        )?;

        let inference_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "prompt_inference_latency_seconds",
                "Inference provider latency in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["model"],
        )?;

        let inference_errors_total = IntCounterVec::new(
            Opts::new(
                "prompt_inference_errors_total",
                "Total inference provider errors",
            ),
            &["model", "error_type"],
        )?;

        // type: input, output
        let tokens_total = IntCounterVec::new(
            Opts::new("prompt_tokens_total", "Total tokens reported by the model"),
            &["model", "type"],
        )?;

        let empty_outputs_total = IntCounterVec::new(
            Opts::new(
                "prompt_empty_outputs_total",
                "Replies from which no text could be extracted",
            ),
            &["model"],
        )?;

        let artifact_write_errors_total = IntCounter::new(
            "prompt_artifact_write_errors_total",
            "Total failed artifact writes",
        )?;

        registry.register(Box::new(invocations_total.clone()))?;
        registry.register(Box::new(inference_latency_seconds.clone()))?;
        registry.register(Box::new(inference_errors_total.clone()))?;
        registry.register(Box::new(tokens_total.clone()))?;
        registry.register(Box::new(empty_outputs_total.clone()))?;
        registry.register(Box::new(artifact_write_errors_total.clone()))?;

        Ok(Self {
            registry,
            invocations_total,
            inference_latency_seconds,
            inference_errors_total,
            tokens_total,
            empty_outputs_total,
            artifact_write_errors_total,
        })
    }

    /// Record the end of an invocation.
    pub fn record_invocation(&self, outcome: &str) {
        self.invocations_total.with_label_values(&[outcome]).inc();
    }

    /// Record provider latency.
    pub fn record_inference_latency(&self, model: &str, duration_secs: f64) {
        self.inference_latency_seconds
            .with_label_values(&[model])
            .observe(duration_secs);
    }

    /// Record a provider error.
    pub fn record_inference_error(&self, model: &str, error_type: &str) {
        self.inference_errors_total
            .with_label_values(&[model, error_type])
            .inc();
    }

    /// Record token usage reported by the model.
    pub fn record_tokens(&self, model: &str, input_tokens: u64, output_tokens: u64) {
        self.tokens_total
            .with_label_values(&[model, "input"])
            .inc_by(input_tokens);
        self.tokens_total
            .with_label_values(&[model, "output"])
            .inc_by(output_tokens);
    }

    pub fn record_empty_output(&self, model: &str) {
        self.empty_outputs_total.with_label_values(&[model]).inc();
    }

    pub fn record_artifact_write_error(&self) {
        self.artifact_write_errors_total.inc();
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
