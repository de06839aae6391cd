//! Dense affine projections.
//!
//! Linear layers accept inputs shaped `(rows, in_dim)` or
//! `(batch, seq, in_dim)` and return the same layout with `out_dim` features.
//! Parameters are owned [`Var`]s: the weight is stored `(out_dim, in_dim)` and
//! the optional bias `(out_dim,)`, so an optimizer can update them in place.

use candle_core::{DType, Device, Error, Result, Tensor, Var};

use crate::{checks, init::ParamInit};

/// Configuration shared by dense projection layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConfig {
    /// Incoming feature dimension.
    pub input_dim: usize,
    /// Output feature dimension.
    pub output_dim: usize,
    /// Whether a learnable bias vector should be applied.
    pub bias: bool,
}

impl LinearConfig {
    /// Creates a configuration for a projection with bias.
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            bias: true,
        }
    }

    /// Creates a configuration for a bias-free projection.
    pub fn no_bias(input_dim: usize, output_dim: usize) -> Self {
        Self {
            bias: false,
            ..Self::new(input_dim, output_dim)
        }
    }
}

/// Dense affine projection with an optional bias.
#[derive(Debug, Clone)]
pub struct Linear {
    config: LinearConfig,
    weight: Var,
    bias: Option<Var>,
}

impl Linear {
    /// Constructs a linear layer from pre-existing parameters.
    pub fn new(config: LinearConfig, weight: Var, bias: Option<Var>) -> Result<Self> {
        if config.input_dim == 0 || config.output_dim == 0 {
            return Err(Error::Msg(format!(
                "linear dimensions must be non-zero, got {} -> {}",
                config.input_dim, config.output_dim
            )));
        }
        checks::expect_shape(
            "linear.weight",
            weight.as_tensor(),
            &[config.output_dim, config.input_dim],
        )?;
        checks::expect_dtype_in("linear.weight", weight.as_tensor(), &[DType::F32])?;
        match (config.bias, bias.as_ref()) {
            (true, Some(bias)) => {
                checks::expect_shape("linear.bias", bias.as_tensor(), &[config.output_dim])?;
            }
            (false, Some(_)) => {
                return Err(Error::Msg("bias provided but config disables bias".into()))
            }
            (true, None) => {
                return Err(Error::Msg("config expects bias but none supplied".into()))
            }
            (false, None) => {}
        }
        Ok(Self {
            config,
            weight,
            bias,
        })
    }

    /// Builds a linear layer with weights sampled from `init` and a zero bias.
    pub fn with_init(config: LinearConfig, init: &ParamInit, device: &Device) -> Result<Self> {
        let weight = init.sample_var(
            (config.output_dim, config.input_dim),
            config.input_dim,
            config.output_dim,
            device,
        )?;
        let bias = if config.bias {
            Some(Var::zeros(config.output_dim, DType::F32, device)?)
        } else {
            None
        };
        Self::new(config, weight, bias)
    }

    /// Wraps plain tensors, mainly for tests and hand-built fixtures.
    pub fn from_tensors(config: LinearConfig, weight: &Tensor, bias: Option<&Tensor>) -> Result<Self> {
        let weight = Var::from_tensor(weight)?;
        let bias = bias.map(Var::from_tensor).transpose()?;
        Self::new(config, weight, bias)
    }

    /// Returns the static configuration.
    pub fn config(&self) -> &LinearConfig {
        &self.config
    }

    /// Trainable parameters under `scope`.
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = vec![(format!("{scope}.weight"), self.weight.clone())];
        if let Some(bias) = &self.bias {
            params.push((format!("{scope}.bias"), bias.clone()));
        }
        params
    }

    /// Applies `x @ W^T + b` over the last axis.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let weight_t = self.weight.as_tensor().t()?;
        let output = match input.dims() {
            [batch, seq, _] => {
                checks::expect_batch_seq_hidden("linear.input", input, self.config.input_dim)?;
                let flat = input.reshape((*batch * *seq, self.config.input_dim))?;
                flat.matmul(&weight_t)?
                    .reshape((*batch, *seq, self.config.output_dim))?
            }
            [_, hidden] => {
                if *hidden != self.config.input_dim {
                    return Err(Error::Msg(format!(
                        "linear.input: expected last dim {} but received {}",
                        self.config.input_dim, hidden
                    )));
                }
                input.matmul(&weight_t)?
            }
            dims => {
                return Err(Error::Msg(format!(
                    "linear.input: expected [B, T, {0}] or [N, {0}], got {dims:?}",
                    self.config.input_dim
                )))
            }
        };

        match &self.bias {
            Some(bias) => output.broadcast_add(bias.as_tensor()),
            None => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_matches_manual_matmul() -> Result<()> {
        let device = Device::Cpu;
        let weight = Tensor::from_slice(&[1f32, 0., 2., -1., 1., 0.], (2, 3), &device)?;
        let bias = Tensor::from_slice(&[0.5f32, -0.5], 2, &device)?;
        let linear = Linear::from_tensors(LinearConfig::new(3, 2), &weight, Some(&bias))?;

        let input = Tensor::from_slice(&[1f32, 2., 3.], (1, 3), &device)?;
        let output = linear.forward(&input)?.to_vec2::<f32>()?;
        assert_eq!(output, vec![vec![7.5, 0.5]]);
        Ok(())
    }

    #[test]
    fn rank_three_inputs_keep_their_layout() -> Result<()> {
        let device = Device::Cpu;
        let linear = Linear::with_init(LinearConfig::no_bias(8, 4), &ParamInit::XavierUniform, &device)?;
        let input = Tensor::randn(0f32, 1.0, (2, 5, 8), &device)?;
        let output = linear.forward(&input)?;
        assert_eq!(output.dims(), &[2, 5, 4]);
        let names: Vec<_> = linear
            .named_parameters("gate")
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["gate.weight"]);
        Ok(())
    }

    #[test]
    fn mismatched_width_fails_fast() -> Result<()> {
        let device = Device::Cpu;
        let linear = Linear::with_init(LinearConfig::new(8, 4), &ParamInit::XavierUniform, &device)?;
        let input = Tensor::zeros((2, 5, 7), DType::F32, &device)?;
        assert!(linear.forward(&input).is_err());
        let flat = Tensor::zeros((3, 7), DType::F32, &device)?;
        assert!(linear.forward(&flat).is_err());
        Ok(())
    }

    #[test]
    fn bias_flag_must_agree_with_parameters() -> Result<()> {
        let device = Device::Cpu;
        let weight = Tensor::zeros((2, 3), DType::F32, &device)?;
        let bias = Tensor::zeros(2, DType::F32, &device)?;
        assert!(Linear::from_tensors(LinearConfig::no_bias(3, 2), &weight, Some(&bias)).is_err());
        assert!(Linear::from_tensors(LinearConfig::new(3, 2), &weight, None).is_err());
        Ok(())
    }
}
