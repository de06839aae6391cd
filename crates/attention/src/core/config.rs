//! Construction-time options shared by the attention pooling layers.

use layers::ParamInit;

/// Widths and initialisation of an attention pooling block.
///
/// `in_features` is the width of the gate for 2D attention and of the pooled
/// input for 1D attention; `out_features` is the width the compatibility
/// score is computed in. See the individual layers for the exact roles.
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionConfig {
    pub in_features: usize,
    pub out_features: usize,
    pub init: ParamInit,
}

impl AttentionConfig {
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self {
            in_features,
            out_features,
            init: ParamInit::default(),
        }
    }

    pub fn with_init(mut self, init: ParamInit) -> Self {
        self.init = init;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), super::AttentionError> {
        if self.in_features == 0 || self.out_features == 0 {
            return Err(super::AttentionError::InvalidConfig(format!(
                "feature widths must be non-zero, got {} -> {}",
                self.in_features, self.out_features
            )));
        }
        Ok(())
    }
}
