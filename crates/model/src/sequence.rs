//! Slice-sequence classifier for whole CT scans.
//!
//! Slices are embedded independently by a shared extractor, an LSTM reads
//! the embeddings in order and the configured aggregation reduces its states
//! to one vector per scan.

use std::sync::Arc;

use candle_core::{Device, Tensor, Var};

use crate::{
    aggregation::TemporalAggregator,
    backbone::{ConvBackbone, EmbeddingExtractor},
    config::ClassifierConfig,
    encoder::SequenceEncoder,
    error::ModelError,
    head::ClassificationHead,
};

/// Logits plus the per-slice attention weights when available.
#[derive(Debug, Clone)]
pub struct SequenceOutput {
    /// `(batch, num_classes)`.
    pub logits: Tensor,
    /// `(batch, len)` for the attention aggregation, `None` for flatten.
    pub slice_weights: Option<Tensor>,
}

/// Classifies CT scans given as sequences of slices.
///
/// `(batch, len, height, width)` slices are embedded one by one, the
/// embedding sequence is aggregated over time and the result is mapped to
/// class logits.
#[derive(Debug)]
pub struct SequenceClassifier {
    config: ClassifierConfig,
    encoder: SequenceEncoder,
    aggregator: TemporalAggregator,
    head: ClassificationHead,
}

impl SequenceClassifier {
    /// Builds the model with the configured [`ConvBackbone`].
    pub fn new(config: ClassifierConfig, device: &Device) -> Result<Self, ModelError> {
        config.validate()?;
        let backbone = ConvBackbone::new(&config.backbone, &config.init.weights()?, device)?;
        Self::assemble(config, Arc::new(backbone), device)
    }

    /// Builds the model around any embedding extractor; the `backbone`
    /// section of `config` is neither used nor validated.
    pub fn with_extractor(
        config: ClassifierConfig,
        extractor: Arc<dyn EmbeddingExtractor>,
        device: &Device,
    ) -> Result<Self, ModelError> {
        config.validate_without_backbone()?;
        Self::assemble(config, extractor, device)
    }

    fn assemble(
        config: ClassifierConfig,
        extractor: Arc<dyn EmbeddingExtractor>,
        device: &Device,
    ) -> Result<Self, ModelError> {
        let weight_init = config.init.weights()?;
        let recurrent_init = config.init.recurrent()?;

        let encoder = SequenceEncoder::new(extractor);
        let aggregator = TemporalAggregator::from_config(
            encoder.embedding_dim(),
            &config.sequence,
            &weight_init,
            &recurrent_init,
            device,
        )?;
        let head = ClassificationHead::new(
            aggregator.output_dim(),
            config.num_classes,
            &weight_init,
            device,
        )?;

        let model = Self {
            config,
            encoder,
            aggregator,
            head,
        };
        log::info!(
            "model::sequence init aggregation={:?} gate={:?} seq_len={} hidden={} embedding_dim={} classes={} parameters={}",
            model.config.sequence.aggregation,
            model.config.sequence.gate,
            model.config.sequence.seq_len,
            model.config.sequence.hidden_size,
            model.encoder.embedding_dim(),
            model.config.num_classes,
            model.parameter_count()
        );
        Ok(model)
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Produces logits `(batch, num_classes)`.
    pub fn forward(&self, slices: &Tensor) -> Result<Tensor, ModelError> {
        Ok(self.forward_with_attention(slices)?.logits)
    }

    /// Produces logits and, for the attention aggregation, slice weights.
    pub fn forward_with_attention(&self, slices: &Tensor) -> Result<SequenceOutput, ModelError> {
        let expected = self.aggregator.expected_seq_len();
        if let (Some(expected), [_, actual, _, _]) = (expected, slices.dims()) {
            if *actual != expected {
                return Err(ModelError::SequenceLength {
                    expected,
                    actual: *actual,
                });
            }
        }
        let embeddings = self.encoder.forward(slices)?;
        let aggregated = self.aggregator.forward(&embeddings)?;
        let logits = self.head.forward(&aggregated.features)?;
        Ok(SequenceOutput {
            logits,
            slice_weights: aggregated.weights,
        })
    }

    /// Every trainable parameter with a dotted name.
    pub fn named_parameters(&self) -> Vec<(String, Var)> {
        let mut params = self.encoder.named_parameters("backbone");
        params.extend(self.aggregator.named_parameters("temporal"));
        params.extend(self.head.named_parameters("head"));
        params
    }

    /// Trainable parameters in the form optimizers take them.
    pub fn parameters(&self) -> Vec<Var> {
        self.named_parameters()
            .into_iter()
            .map(|(_, var)| var)
            .collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.named_parameters()
            .iter()
            .map(|(_, var)| var.as_tensor().elem_count())
            .sum()
    }
}
