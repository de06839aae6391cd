//! Parameter initialisation policies.
//!
//! Every learned tensor in this workspace is an owned [`Var`] sampled once at
//! construction. Policies receive the fan-in/fan-out of the layer they
//! initialise so the same recipe can serve dense, convolutional and recurrent
//! weights (for a convolution, `fan_in = in_channels * k * k`).

use candle_core::{Device, Result, Shape, Tensor, Var};

/// Supported weight initialisation policies.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamInit {
    /// Xavier/Glorot uniform initialisation.
    XavierUniform,
    /// Xavier/Glorot normal initialisation.
    XavierNormal,
    /// Kaiming/He uniform initialisation.
    KaimingUniform { negative_slope: f64 },
    /// Kaiming/He normal initialisation.
    KaimingNormal { negative_slope: f64 },
    /// `U(-bound, bound)` with `bound = 1 / sqrt(fan_in)`, the default for
    /// recurrent and dense layers in most frameworks.
    FanInUniform,
    /// Every element set to the same value. Mostly useful in tests.
    Constant(f64),
    /// Scales another policy.
    Scaled { base: Box<ParamInit>, scale: f64 },
}

impl ParamInit {
    /// Convenience helper to scale an existing policy.
    pub fn scaled(base: ParamInit, scale: f64) -> Self {
        Self::Scaled {
            base: Box::new(base),
            scale,
        }
    }

    /// Parses the policy names accepted in configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "xavier_uniform" | "glorot_uniform" => Some(Self::XavierUniform),
            "xavier_normal" | "glorot_normal" => Some(Self::XavierNormal),
            "kaiming_uniform" | "he_uniform" => Some(Self::default()),
            "kaiming_normal" | "he_normal" => Some(Self::KaimingNormal {
                negative_slope: 0.0,
            }),
            "fan_in_uniform" | "uniform" => Some(Self::FanInUniform),
            "zeros" => Some(Self::Constant(0.0)),
            _ => None,
        }
    }

    /// Samples an `f32` tensor of `shape` for a layer with the given fans.
    pub fn sample<S: Into<Shape>>(
        &self,
        shape: S,
        fan_in: usize,
        fan_out: usize,
        device: &Device,
    ) -> Result<Tensor> {
        let shape = shape.into();
        let (fan_in, fan_out) = (fan_in.max(1) as f64, fan_out.max(1) as f64);
        match self {
            ParamInit::XavierUniform => {
                let bound = (6.0f64 / (fan_in + fan_out)).sqrt();
                Tensor::rand(-bound as f32, bound as f32, shape, device)
            }
            ParamInit::XavierNormal => {
                let std = (2.0f64 / (fan_in + fan_out)).sqrt();
                Tensor::randn(0f32, std as f32, shape, device)
            }
            ParamInit::KaimingUniform { negative_slope } => {
                let gain = (2.0f64 / (1.0 + negative_slope.powi(2))).sqrt();
                let bound = 3.0f64.sqrt() * gain / fan_in.sqrt();
                Tensor::rand(-bound as f32, bound as f32, shape, device)
            }
            ParamInit::KaimingNormal { negative_slope } => {
                let gain = (2.0f64 / (1.0 + negative_slope.powi(2))).sqrt();
                let std = gain / fan_in.sqrt();
                Tensor::randn(0f32, std as f32, shape, device)
            }
            ParamInit::FanInUniform => {
                let bound = 1.0 / fan_in.sqrt();
                Tensor::rand(-bound as f32, bound as f32, shape, device)
            }
            ParamInit::Constant(value) => Tensor::full(*value as f32, shape, device),
            ParamInit::Scaled { base, scale } => {
                let sampled = base.sample(shape, fan_in as usize, fan_out as usize, device)?;
                sampled.affine(*scale, 0.0)
            }
        }
    }

    /// Samples a trainable variable.
    pub fn sample_var<S: Into<Shape>>(
        &self,
        shape: S,
        fan_in: usize,
        fan_out: usize,
        device: &Device,
    ) -> Result<Var> {
        let tensor = self.sample(shape, fan_in, fan_out, device)?;
        Var::from_tensor(&tensor)
    }
}

impl Default for ParamInit {
    fn default() -> Self {
        ParamInit::KaimingUniform {
            negative_slope: 5f64.sqrt(),
        }
    }
}
