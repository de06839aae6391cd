//! Error types emitted by attention pooling layers.

use thiserror::Error;

/// Attention-specific error category.
#[derive(Debug, Error)]
pub enum AttentionError {
    /// The supplied tensor shapes do not align with the documented contract.
    #[error("shape mismatch: {context}")]
    ShapeMismatch { context: String },
    /// The layer only computes in `f32`.
    #[error("unsupported dtype {requested}")]
    UnsupportedDType { requested: String },
    /// Layer parameters do not describe a valid attention block.
    #[error("invalid attention configuration: {0}")]
    InvalidConfig(String),
    /// A backend-specific failure propagated to the caller.
    #[error(transparent)]
    Backend(#[from] candle_core::Error),
}

impl AttentionError {
    pub(crate) fn shape(context: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
        }
    }
}
