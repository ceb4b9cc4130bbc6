pub mod metrics;
pub mod providers;
pub mod storage;

pub use providers::{InferenceProvider, ProviderError};
pub use storage::{ArtifactStorage, LocalStorage, S3Storage, StorageError};
pub use metrics::PromptMetrics;
