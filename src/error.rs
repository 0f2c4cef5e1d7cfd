use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the ingestion, detection and sink stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("malformed document at {location}: {reason}")]
    MalformedDocument { location: String, reason: String },

    #[error("model file not found: {}", path.display())]
    ModelNotFound { path: PathBuf },

    #[error("unsupported model format version {found} (expected {expected})")]
    UnsupportedModelFormat { found: u32, expected: u32 },

    #[error("training set is empty: the source ended before any full rolling window was collected")]
    EmptyTrainingSet,

    #[error("detector has not been fitted")]
    NotFitted,

    #[error("feature count mismatch. Expected {expected}, got {found}")]
    FeatureMismatch { expected: usize, found: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("sink write failed: {0}")]
    Sink(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
