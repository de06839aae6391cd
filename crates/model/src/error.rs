//! Error type for classifier construction and inference.

use attention::AttentionError;
use thiserror::Error;

/// Failures raised while configuring or running a classifier.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ConfigFormat(String),
    #[error("invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),
    /// The fixed-length aggregation was fed a sequence of another length.
    #[error("expected sequences of length {expected} but received {actual}")]
    SequenceLength { expected: usize, actual: usize },
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error(transparent)]
    Attention(#[from] AttentionError),
    #[error(transparent)]
    Backend(#[from] candle_core::Error),
}

impl ModelError {
    pub(crate) fn shape(message: impl Into<String>) -> Self {
        Self::Shape(message.into())
    }

    pub(crate) fn validation(messages: Vec<String>) -> Self {
        Self::Validation(messages)
    }
}

impl From<toml::de::Error> for ModelError {
    fn from(value: toml::de::Error) -> Self {
        ModelError::ConfigFormat(value.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(value: serde_json::Error) -> Self {
        ModelError::ConfigFormat(value.to_string())
    }
}
