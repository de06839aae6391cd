//! Attention pooling over `(batch, len, features)` sequences.

use candle_core::{Device, Tensor, Var};
use candle_nn::ops::softmax;
use layers::{Linear, LinearConfig};

use crate::core::{expect_f32, AttentionConfig, AttentionError, AttentionOutput, AttentionPool};

/// Attention pooling over a sequence of feature vectors.
///
/// * `input`: `(batch, len, in_features)`
/// * `gate`: `(batch, out_features)`
/// * weights: `(batch, len)`, pooled: `(batch, in_features)`
///
/// Keys are `input @ W^T` with a bias-free `W: (out_features, in_features)`
/// that is applied even when both widths agree. The projection only feeds the
/// scores; the pooled vector sums the unprojected input.
#[derive(Debug, Clone)]
pub struct LinearAttention1d {
    in_features: usize,
    out_features: usize,
    gate: Linear,
}

impl LinearAttention1d {
    pub fn new(config: &AttentionConfig, device: &Device) -> Result<Self, AttentionError> {
        config.validate()?;
        let gate = Linear::with_init(
            LinearConfig::no_bias(config.in_features, config.out_features),
            &config.init,
            device,
        )?;
        log::debug!(
            "attention1d in_features={} out_features={}",
            config.in_features,
            config.out_features
        );
        Self::from_gate(gate)
    }

    /// Wraps an existing key projection; it must not carry a bias.
    pub fn from_gate(gate: Linear) -> Result<Self, AttentionError> {
        let cfg = gate.config();
        if cfg.bias {
            return Err(AttentionError::InvalidConfig(
                "attention key projection must be bias-free".into(),
            ));
        }
        Ok(Self {
            in_features: cfg.input_dim,
            out_features: cfg.output_dim,
            gate,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    fn validate(&self, input: &Tensor, gate: &Tensor) -> Result<(usize, usize), AttentionError> {
        expect_f32("attention1d.input", input)?;
        expect_f32("attention1d.gate", gate)?;
        let (batch, len, width) = match input.dims() {
            [batch, len, width] => (*batch, *len, *width),
            dims => {
                return Err(AttentionError::shape(format!(
                    "attention1d input must be (batch, len, {}), got {dims:?}",
                    self.in_features
                )))
            }
        };
        if width != self.in_features {
            return Err(AttentionError::shape(format!(
                "attention1d expected input width {} but received {width}",
                self.in_features
            )));
        }
        if batch == 0 || len == 0 {
            return Err(AttentionError::shape(format!(
                "attention1d needs at least one sample and one position, got {:?}",
                input.dims()
            )));
        }
        if gate.dims() != [batch, self.out_features] {
            return Err(AttentionError::shape(format!(
                "attention1d gate must be ({batch}, {}), got {:?}",
                self.out_features,
                gate.dims()
            )));
        }
        Ok((batch, len))
    }
}

impl AttentionPool for LinearAttention1d {
    fn attend(&self, input: &Tensor, gate: &Tensor) -> Result<AttentionOutput, AttentionError> {
        let (batch, len) = self.validate(input, gate)?;

        let keys = self.gate.forward(input)?;
        let scores = keys.matmul(&gate.unsqueeze(2)?.contiguous()?)?;
        let weights = softmax(&scores, 1)?;
        let pooled = weights.broadcast_mul(input)?.sum(1)?;

        log::trace!("attention1d pooled batch={batch} len={len}");
        Ok(AttentionOutput {
            weights: weights.squeeze(2)?,
            pooled,
        })
    }

    fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        self.gate.named_parameters(&format!("{scope}.gate"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layers::ParamInit;

    fn identity_attention() -> Result<LinearAttention1d, AttentionError> {
        let eye = Tensor::from_slice(&[1f32, 0., 0., 1.], (2, 2), &Device::Cpu)?;
        let gate = Linear::from_tensors(LinearConfig::no_bias(2, 2), &eye, None)?;
        LinearAttention1d::from_gate(gate)
    }

    #[test]
    fn equal_widths_still_project() -> Result<(), AttentionError> {
        let config = AttentionConfig::new(4, 4).with_init(ParamInit::XavierUniform);
        let attention = LinearAttention1d::new(&config, &Device::Cpu)?;
        let params = attention.named_parameters("pool");
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].0, "pool.gate.weight");
        Ok(())
    }

    #[test]
    fn gate_selects_the_most_aligned_position() -> Result<(), AttentionError> {
        let device = Device::Cpu;
        let attention = identity_attention()?;
        let input = Tensor::from_slice(&[10f32, 0., 0., 10.], (1, 2, 2), &device)?;
        let gate = Tensor::from_slice(&[1f32, 0.], (1, 2), &device)?;

        let output = attention.attend(&input, &gate)?;
        let weights = output.weights.to_vec2::<f32>()?;
        assert!(weights[0][0] > 0.999);
        assert!(weights[0][1] < 1e-3);
        Ok(())
    }

    #[test]
    fn biased_key_projection_is_rejected() -> Result<(), AttentionError> {
        let linear = Linear::with_init(LinearConfig::new(3, 3), &ParamInit::XavierUniform, &Device::Cpu)?;
        assert!(matches!(
            LinearAttention1d::from_gate(linear),
            Err(AttentionError::InvalidConfig(_))
        ));
        Ok(())
    }
}
