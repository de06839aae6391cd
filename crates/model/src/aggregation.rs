//! Temporal aggregation of per-slice embeddings.
//!
//! An LSTM runs over the `(batch, len, embedding_dim)` sequence and one of two
//! strategies, fixed at construction, reduces its hidden states to a single
//! vector per scan:
//!
//! * [`FlattenAggregation`] concatenates all `len` hidden states. The head
//!   after it is `len * hidden` wide, so the model only accepts the sequence
//!   length it was built for.
//! * [`AttentionAggregation`] attention-pools the hidden states and reports
//!   the per-slice weights; it accepts any length.

use attention::{AttentionConfig, AttentionPool, LinearAttention1d};
use candle_core::{Device, Tensor, Var};
use layers::{Lstm, LstmConfig, LstmOutput, ParamInit};

use crate::{
    config::{AggregationKind, GateKind, SequenceConfig},
    error::ModelError,
};

/// Aggregated representation of a batch of sequences.
#[derive(Debug, Clone)]
pub struct Aggregated {
    /// `(batch, output_dim)`.
    pub features: Tensor,
    /// Per-slice attention weights `(batch, len)` when the strategy has them.
    pub weights: Option<Tensor>,
}

/// Reduces LSTM outputs to one vector per sequence.
pub trait Aggregation: Send + Sync + std::fmt::Debug {
    fn output_dim(&self) -> usize;

    /// Sequence length the strategy is tied to, if any.
    fn expected_seq_len(&self) -> Option<usize> {
        None
    }

    fn aggregate(&self, recurrent: &LstmOutput) -> Result<Aggregated, ModelError>;

    fn named_parameters(&self, scope: &str) -> Vec<(String, Var)>;
}

#[derive(Debug, Clone)]
pub struct FlattenAggregation {
    seq_len: usize,
    hidden: usize,
}

impl FlattenAggregation {
    pub fn new(seq_len: usize, hidden: usize) -> Self {
        Self { seq_len, hidden }
    }
}

impl Aggregation for FlattenAggregation {
    fn output_dim(&self) -> usize {
        self.seq_len * self.hidden
    }

    fn expected_seq_len(&self) -> Option<usize> {
        Some(self.seq_len)
    }

    fn aggregate(&self, recurrent: &LstmOutput) -> Result<Aggregated, ModelError> {
        let (batch, len, hidden) = recurrent.hidden_states.dims3()?;
        if len != self.seq_len {
            return Err(ModelError::SequenceLength {
                expected: self.seq_len,
                actual: len,
            });
        }
        if hidden != self.hidden {
            return Err(ModelError::shape(format!(
                "flatten aggregation expected hidden width {} but received {hidden}",
                self.hidden
            )));
        }
        let features = recurrent
            .hidden_states
            .reshape((batch, self.output_dim()))?;
        Ok(Aggregated {
            features,
            weights: None,
        })
    }

    fn named_parameters(&self, _scope: &str) -> Vec<(String, Var)> {
        Vec::new()
    }
}

/// Where the attention query comes from.
#[derive(Debug, Clone)]
pub enum GateSource {
    /// A learned `(attention_dim,)` vector shared by every sequence.
    Learned(Var),
    /// The LSTM hidden state after the last position.
    FinalHidden,
}

#[derive(Debug, Clone)]
pub struct AttentionAggregation {
    attention: LinearAttention1d,
    gate: GateSource,
}

impl AttentionAggregation {
    pub fn new(attention: LinearAttention1d, gate: GateSource) -> Result<Self, ModelError> {
        match &gate {
            GateSource::Learned(query) => {
                if query.as_tensor().dims() != [attention.out_features()] {
                    return Err(ModelError::shape(format!(
                        "learned gate must be ({},), got {:?}",
                        attention.out_features(),
                        query.as_tensor().dims()
                    )));
                }
            }
            GateSource::FinalHidden => {
                if attention.out_features() != attention.in_features() {
                    return Err(ModelError::validation(vec![format!(
                        "final-hidden gating needs attention width {} to match hidden width {}",
                        attention.out_features(),
                        attention.in_features()
                    )]));
                }
            }
        }
        Ok(Self { attention, gate })
    }

    fn gate_for(&self, recurrent: &LstmOutput, batch: usize) -> Result<Tensor, ModelError> {
        match &self.gate {
            GateSource::Learned(query) => Ok(query
                .as_tensor()
                .unsqueeze(0)?
                .broadcast_as((batch, self.attention.out_features()))?
                .contiguous()?),
            GateSource::FinalHidden => Ok(recurrent.final_hidden.clone()),
        }
    }
}

impl Aggregation for AttentionAggregation {
    fn output_dim(&self) -> usize {
        self.attention.in_features()
    }

    fn aggregate(&self, recurrent: &LstmOutput) -> Result<Aggregated, ModelError> {
        let (batch, _, _) = recurrent.hidden_states.dims3()?;
        let gate = self.gate_for(recurrent, batch)?;
        let output = self.attention.attend(&recurrent.hidden_states, &gate)?;
        Ok(Aggregated {
            features: output.pooled,
            weights: Some(output.weights),
        })
    }

    fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = self.attention.named_parameters(&format!("{scope}.attention"));
        if let GateSource::Learned(query) = &self.gate {
            params.push((format!("{scope}.query"), query.clone()));
        }
        params
    }
}

/// LSTM followed by an aggregation strategy.
#[derive(Debug)]
pub struct TemporalAggregator {
    lstm: Lstm,
    strategy: Box<dyn Aggregation>,
}

impl TemporalAggregator {
    pub fn new(lstm: Lstm, strategy: Box<dyn Aggregation>) -> Self {
        Self { lstm, strategy }
    }

    /// Builds the LSTM and the strategy named by `config`.
    pub fn from_config(
        embedding_dim: usize,
        config: &SequenceConfig,
        weight_init: &ParamInit,
        recurrent_init: &ParamInit,
        device: &Device,
    ) -> Result<Self, ModelError> {
        let hidden = config.hidden_size;
        let lstm = Lstm::with_init(LstmConfig::new(embedding_dim, hidden), recurrent_init, device)?;
        let strategy: Box<dyn Aggregation> = match config.aggregation {
            AggregationKind::Flatten => Box::new(FlattenAggregation::new(config.seq_len, hidden)),
            AggregationKind::Attention => {
                let width = config.attention_dim();
                let attention = LinearAttention1d::new(
                    &AttentionConfig::new(hidden, width).with_init(weight_init.clone()),
                    device,
                )?;
                let gate = match config.gate {
                    GateKind::Learned => {
                        GateSource::Learned(recurrent_init.sample_var(width, width, 1, device)?)
                    }
                    GateKind::FinalHidden => GateSource::FinalHidden,
                };
                Box::new(AttentionAggregation::new(attention, gate)?)
            }
        };
        Ok(Self::new(lstm, strategy))
    }

    pub fn output_dim(&self) -> usize {
        self.strategy.output_dim()
    }

    pub fn expected_seq_len(&self) -> Option<usize> {
        self.strategy.expected_seq_len()
    }

    /// Aggregates embeddings `(batch, len, embedding_dim)`.
    pub fn forward(&self, embeddings: &Tensor) -> Result<Aggregated, ModelError> {
        let recurrent = self.lstm.forward(embeddings)?;
        self.strategy.aggregate(&recurrent)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = self.lstm.named_parameters(&format!("{scope}.lstm"));
        params.extend(self.strategy.named_parameters(scope));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence_config(aggregation: AggregationKind, gate: GateKind) -> SequenceConfig {
        SequenceConfig {
            seq_len: 4,
            hidden_size: 6,
            aggregation,
            gate,
            attention_dim: None,
        }
    }

    fn build(config: &SequenceConfig) -> Result<TemporalAggregator, ModelError> {
        TemporalAggregator::from_config(
            5,
            config,
            &ParamInit::default(),
            &ParamInit::FanInUniform,
            &Device::Cpu,
        )
    }

    #[test]
    fn flatten_concatenates_every_hidden_state() -> Result<(), ModelError> {
        let aggregator = build(&sequence_config(AggregationKind::Flatten, GateKind::FinalHidden))?;
        assert_eq!(aggregator.output_dim(), 24);
        assert_eq!(aggregator.expected_seq_len(), Some(4));

        let embeddings = Tensor::randn(0f32, 1.0, (2, 4, 5), &Device::Cpu)?;
        let aggregated = aggregator.forward(&embeddings)?;
        assert_eq!(aggregated.features.dims(), &[2, 24]);
        assert!(aggregated.weights.is_none());
        Ok(())
    }

    #[test]
    fn flatten_rejects_other_lengths() -> Result<(), ModelError> {
        let aggregator = build(&sequence_config(AggregationKind::Flatten, GateKind::FinalHidden))?;
        let embeddings = Tensor::randn(0f32, 1.0, (2, 3, 5), &Device::Cpu)?;
        assert!(matches!(
            aggregator.forward(&embeddings),
            Err(ModelError::SequenceLength {
                expected: 4,
                actual: 3
            })
        ));
        Ok(())
    }

    #[test]
    fn attention_handles_any_length_with_either_gate() -> Result<(), ModelError> {
        for gate in [GateKind::Learned, GateKind::FinalHidden] {
            let aggregator = build(&sequence_config(AggregationKind::Attention, gate))?;
            assert_eq!(aggregator.output_dim(), 6);
            assert_eq!(aggregator.expected_seq_len(), None);

            for len in [1, 4, 9] {
                let embeddings = Tensor::randn(0f32, 1.0, (3, len, 5), &Device::Cpu)?;
                let aggregated = aggregator.forward(&embeddings)?;
                assert_eq!(aggregated.features.dims(), &[3, 6]);
                let weights = aggregated.weights.expect("attention weights");
                assert_eq!(weights.dims(), &[3, len]);
            }
        }
        Ok(())
    }

    #[test]
    fn learned_gate_is_a_named_parameter() -> Result<(), ModelError> {
        let mut config = sequence_config(AggregationKind::Attention, GateKind::Learned);
        config.attention_dim = Some(3);
        let aggregator = build(&config)?;
        let names: Vec<_> = aggregator
            .named_parameters("temporal")
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert!(names.contains(&"temporal.query".to_string()));
        assert!(names.contains(&"temporal.attention.gate.weight".to_string()));
        assert!(names.contains(&"temporal.lstm.w_ih".to_string()));
        Ok(())
    }

    #[test]
    fn final_hidden_gate_needs_matching_width() -> Result<(), ModelError> {
        let attention = LinearAttention1d::new(&AttentionConfig::new(6, 3), &Device::Cpu)?;
        assert!(matches!(
            AttentionAggregation::new(attention, GateSource::FinalHidden),
            Err(ModelError::Validation(_))
        ));
        Ok(())
    }
}
