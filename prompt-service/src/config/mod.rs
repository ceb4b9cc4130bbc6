use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

pub const DEFAULT_BUCKET: &str = "lambda-bedrock-artifacts";
pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-haiku-20240307-v1:0";
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, Deserialize)]
pub struct PromptConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub aws: AwsConfig,
    pub models: ModelConfig,
    pub storage: StorageConfig,
    pub inference: InferenceConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Bedrock model identifier sent with every Converse call and echoed in
    /// responses and artifacts.
    pub model_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: String,
    pub local_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    pub backend: InferenceBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Local,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InferenceBackend {
    Bedrock,
    Mock,
}

impl PromptConfig {
    /// Read the configuration once at process start. Every setting has a
    /// fallback, so an empty environment yields a usable S3 + Bedrock setup.
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        Ok(PromptConfig {
            common: common_config,
            aws: AwsConfig {
                region: get_env("AWS_REGION", DEFAULT_REGION),
            },
            models: ModelConfig {
                model_id: get_env("MODEL_ID", DEFAULT_MODEL_ID),
            },
            storage: StorageConfig {
                backend: get_env("STORAGE_BACKEND", "s3")
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
                bucket: get_env("BUCKET_NAME", DEFAULT_BUCKET),
                local_path: get_env("STORAGE_LOCAL_PATH", "storage"),
            },
            inference: InferenceConfig {
                backend: get_env("INFERENCE_BACKEND", "bedrock")
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            observability: ObservabilityConfig {
                log_level: get_env("LOG_LEVEL", "info"),
                otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            },
        })
    }

    /// Local development setup: mock model, artifacts on disk, random port.
    pub fn local(local_path: impl Into<String>) -> Self {
        PromptConfig {
            common: core_config::Config { port: 0 },
            aws: AwsConfig {
                region: DEFAULT_REGION.to_string(),
            },
            models: ModelConfig {
                model_id: DEFAULT_MODEL_ID.to_string(),
            },
            storage: StorageConfig {
                backend: StorageBackend::Local,
                bucket: DEFAULT_BUCKET.to_string(),
                local_path: local_path.into(),
            },
            inference: InferenceConfig {
                backend: InferenceBackend::Mock,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                otlp_endpoint: None,
            },
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "local" => Ok(StorageBackend::Local),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}

impl std::str::FromStr for InferenceBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bedrock" => Ok(InferenceBackend::Bedrock),
            "mock" => Ok(InferenceBackend::Mock),
            _ => Err(format!("Invalid inference backend: {}", s)),
        }
    }
}

/// Unset and empty both fall back to `default`.
fn get_env(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
