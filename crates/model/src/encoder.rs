//! Per-slice embedding of CT slice sequences.

use std::sync::Arc;

use candle_core::{Tensor, Var};

use crate::{
    backbone::{replicate_channels, EmbeddingExtractor},
    error::ModelError,
};

/// Embeds every slice of a scan with one shared extractor.
///
/// Input is `(batch, len, height, width)` single-channel slices; output is
/// `(batch, len, embedding_dim)`.
#[derive(Clone)]
pub struct SequenceEncoder {
    extractor: Arc<dyn EmbeddingExtractor>,
}

impl std::fmt::Debug for SequenceEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceEncoder")
            .field("input_channels", &self.extractor.input_channels())
            .field("embedding_dim", &self.extractor.embedding_dim())
            .finish()
    }
}

impl SequenceEncoder {
    pub fn new(extractor: Arc<dyn EmbeddingExtractor>) -> Self {
        Self { extractor }
    }

    pub fn embedding_dim(&self) -> usize {
        self.extractor.embedding_dim()
    }

    pub fn forward(&self, slices: &Tensor) -> Result<Tensor, ModelError> {
        let (batch, len, height, width) = match slices.dims() {
            [b, l, h, w] => (*b, *l, *h, *w),
            dims => {
                return Err(ModelError::shape(format!(
                    "slice sequences must be (batch, len, height, width), got {dims:?}"
                )))
            }
        };
        if batch == 0 || len == 0 {
            return Err(ModelError::shape(format!(
                "slice sequences need a non-empty batch and length, got {:?}",
                slices.dims()
            )));
        }

        let flat = slices.reshape((batch * len, 1, height, width))?;
        let images = replicate_channels(&flat, self.extractor.input_channels())?;
        let embeddings = self.extractor.forward(&images)?;

        let dim = self.extractor.embedding_dim();
        if embeddings.dims() != [batch * len, dim] {
            return Err(ModelError::shape(format!(
                "extractor returned {:?}, expected ({}, {dim})",
                embeddings.dims(),
                batch * len
            )));
        }
        log::debug!("encoded {batch}x{len} slices into {dim}-wide embeddings");
        Ok(embeddings.reshape((batch, len, dim))?)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        self.extractor.named_parameters(scope)
    }
}
