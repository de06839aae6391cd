//! Final dense layer producing class logits.

use candle_core::{Device, Tensor, Var};
use layers::{Linear, LinearConfig, ParamInit};

use crate::error::ModelError;

/// Dense map from an aggregated representation to raw class logits.
///
/// No activation is applied; see [`crate::prediction`] for probabilities.
#[derive(Debug, Clone)]
pub struct ClassificationHead {
    linear: Linear,
}

impl ClassificationHead {
    pub fn new(
        input_dim: usize,
        num_classes: usize,
        init: &ParamInit,
        device: &Device,
    ) -> Result<Self, ModelError> {
        let linear = Linear::with_init(LinearConfig::new(input_dim, num_classes), init, device)?;
        Ok(Self { linear })
    }

    pub fn from_linear(linear: Linear) -> Self {
        Self { linear }
    }

    pub fn input_dim(&self) -> usize {
        self.linear.config().input_dim
    }

    pub fn num_classes(&self) -> usize {
        self.linear.config().output_dim
    }

    /// Maps `(batch, input_dim)` features to `(batch, num_classes)` logits.
    pub fn forward(&self, features: &Tensor) -> Result<Tensor, ModelError> {
        match features.dims() {
            [_, width] if *width == self.input_dim() => Ok(self.linear.forward(features)?),
            dims => Err(ModelError::shape(format!(
                "classification head expects (batch, {}), got {dims:?}",
                self.input_dim()
            ))),
        }
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        self.linear.named_parameters(scope)
    }
}
