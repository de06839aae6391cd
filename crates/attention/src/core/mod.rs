//! Core traits and types shared across attention pooling layers.
//!
//! A pooling layer scores every position of its input against a gate,
//! normalises the scores with a softmax over the reduction axis and returns
//! both the weights and the weighted sum of the input.

pub mod config;
pub mod errors;

use candle_core::{DType, Tensor, Var};

pub use config::AttentionConfig;
pub use errors::AttentionError;

/// Result of one attention pooling pass.
#[derive(Debug, Clone)]
pub struct AttentionOutput {
    /// Normalised weights over the reduced positions.
    pub weights: Tensor,
    /// Weighted sum of the input, one vector per sample.
    pub pooled: Tensor,
}

/// Unified interface for attention pooling layers.
///
/// * `input` holds the values being pooled, `gate` the query they are scored
///   against; the accepted layouts are documented on each implementation.
/// * Weights are non-negative and sum to one along the reduction axis for
///   every sample.
/// * Shape mismatches fail with [`AttentionError::ShapeMismatch`] before any
///   computation happens.
pub trait AttentionPool: Send + Sync {
    fn attend(&self, input: &Tensor, gate: &Tensor) -> Result<AttentionOutput, AttentionError>;

    /// Trainable parameters under `scope`.
    fn named_parameters(&self, scope: &str) -> Vec<(String, Var)>;
}

pub(crate) fn expect_f32(label: &str, tensor: &Tensor) -> Result<(), AttentionError> {
    if tensor.dtype() == DType::F32 {
        Ok(())
    } else {
        Err(AttentionError::UnsupportedDType {
            requested: format!("{label}: {:?}", tensor.dtype()),
        })
    }
}
