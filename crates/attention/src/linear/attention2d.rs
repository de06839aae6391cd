//! Attention pooling over `(batch, channels, height, width)` feature maps.
//!
//! The gate map is added to the input before scoring, so it must cover the
//! same grid; a channel projection bridges differing widths.

use candle_core::{Device, Tensor, Var};
use candle_nn::ops::softmax;
use layers::{Conv2d, Conv2dConfig};

use crate::core::{expect_f32, AttentionConfig, AttentionError, AttentionOutput, AttentionPool};

/// Attention pooling over a spatial feature map.
///
/// * `input`: `(batch, out_features, height, width)`
/// * `gate`: `(batch, in_features, height, width)`
/// * weights: `(batch, 1, height, width)`, pooled: `(batch, out_features)`
///
/// The gate is brought to `out_features` channels by a bias-free 1×1
/// convolution only when the widths differ; that choice is made once at
/// construction. A second bias-free 1×1 convolution scores `input + gate`
/// per pixel and the softmax runs jointly over all `height * width`
/// positions of a sample.
#[derive(Debug, Clone)]
pub struct LinearAttention2d {
    in_features: usize,
    out_features: usize,
    projection: Option<Conv2d>,
    score: Conv2d,
}

impl LinearAttention2d {
    pub fn new(config: &AttentionConfig, device: &Device) -> Result<Self, AttentionError> {
        config.validate()?;
        let projection = if config.in_features != config.out_features {
            Some(Conv2d::with_init(
                Conv2dConfig::pointwise(config.in_features, config.out_features),
                &config.init,
                device,
            )?)
        } else {
            None
        };
        let score = Conv2d::with_init(
            Conv2dConfig::pointwise(config.out_features, 1),
            &config.init,
            device,
        )?;
        log::debug!(
            "attention2d in_features={} out_features={} projected={}",
            config.in_features,
            config.out_features,
            projection.is_some()
        );
        Self::from_parts(score, projection)
    }

    /// Assembles the layer from explicit 1×1 convolutions.
    pub fn from_parts(score: Conv2d, projection: Option<Conv2d>) -> Result<Self, AttentionError> {
        let score_cfg = score.config();
        if score_cfg.kernel_size != 1 || score_cfg.out_channels != 1 || score_cfg.bias {
            return Err(AttentionError::InvalidConfig(
                "score must be a bias-free 1x1 convolution with one output channel".into(),
            ));
        }
        let out_features = score_cfg.in_channels;
        let in_features = match &projection {
            Some(proj) => {
                let cfg = proj.config();
                if cfg.kernel_size != 1 || cfg.bias || cfg.out_channels != out_features {
                    return Err(AttentionError::InvalidConfig(format!(
                        "projection must be a bias-free 1x1 convolution to {out_features} channels"
                    )));
                }
                if cfg.in_channels == out_features {
                    return Err(AttentionError::InvalidConfig(
                        "projection is only used when gate and input widths differ".into(),
                    ));
                }
                cfg.in_channels
            }
            None => out_features,
        };
        Ok(Self {
            in_features,
            out_features,
            projection,
            score,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    pub fn is_projected(&self) -> bool {
        self.projection.is_some()
    }

    fn validate(
        &self,
        input: &Tensor,
        gate: &Tensor,
    ) -> Result<(usize, usize, usize), AttentionError> {
        expect_f32("attention2d.input", input)?;
        expect_f32("attention2d.gate", gate)?;
        let (batch, channels, height, width) = match input.dims() {
            [b, c, h, w] => (*b, *c, *h, *w),
            dims => {
                return Err(AttentionError::shape(format!(
                    "attention2d input must be (batch, {}, height, width), got {dims:?}",
                    self.out_features
                )))
            }
        };
        if channels != self.out_features {
            return Err(AttentionError::shape(format!(
                "attention2d expected {} input channels but received {channels}",
                self.out_features
            )));
        }
        if batch == 0 || height == 0 || width == 0 {
            return Err(AttentionError::shape(format!(
                "attention2d needs a non-empty batch and grid, got {:?}",
                input.dims()
            )));
        }
        match gate.dims() {
            [gb, gc, gh, gw] => {
                if (*gh, *gw) != (height, width) {
                    return Err(AttentionError::shape(format!(
                        "attention2d gate grid {gh}x{gw} does not match input grid {height}x{width}"
                    )));
                }
                if *gb != batch || *gc != self.in_features {
                    return Err(AttentionError::shape(format!(
                        "attention2d gate must be ({batch}, {}, {height}, {width}), got {:?}",
                        self.in_features,
                        gate.dims()
                    )));
                }
            }
            dims => {
                return Err(AttentionError::shape(format!(
                    "attention2d gate must be rank 4, got {dims:?}"
                )))
            }
        }
        Ok((batch, height, width))
    }
}

impl AttentionPool for LinearAttention2d {
    fn attend(&self, input: &Tensor, gate: &Tensor) -> Result<AttentionOutput, AttentionError> {
        let (batch, height, width) = self.validate(input, gate)?;
        let positions = height * width;

        let gate = match &self.projection {
            Some(projection) => projection.forward(gate)?,
            None => gate.clone(),
        };
        let scores = self.score.forward(&input.add(&gate)?)?;
        let weights = softmax(&scores.reshape((batch, 1, positions))?, 2)?
            .reshape((batch, 1, height, width))?;
        let pooled = weights
            .broadcast_mul(input)?
            .reshape((batch, self.out_features, positions))?
            .sum(2)?;

        Ok(AttentionOutput { weights, pooled })
    }

    fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = Vec::new();
        if let Some(projection) = &self.projection {
            params.extend(projection.named_parameters(&format!("{scope}.proj")));
        }
        params.extend(self.score.named_parameters(&format!("{scope}.score")));
        params
    }
}
