//! 2D convolutions over `(batch, channels, height, width)` feature maps.
//!
//! The kernel is an owned [`Var`] shaped `(out_channels, in_channels, k, k)`.
//! 1×1 convolutions double as per-pixel channel projections and scoring
//! functions in the attention crate.

use candle_core::{DType, Device, Error, Result, Tensor, Var};

use crate::{checks, init::ParamInit};

/// Static configuration of a square-kernel convolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conv2dConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub bias: bool,
}

impl Conv2dConfig {
    /// A stride-1 convolution that keeps the spatial size for odd kernels.
    pub fn same(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride: 1,
            padding: kernel_size / 2,
            bias: true,
        }
    }

    /// A bias-free 1×1 convolution.
    pub fn pointwise(in_channels: usize, out_channels: usize) -> Self {
        Self {
            bias: false,
            ..Self::same(in_channels, out_channels, 1)
        }
    }

    fn fan_in(&self) -> usize {
        self.in_channels * self.kernel_size * self.kernel_size
    }

    fn fan_out(&self) -> usize {
        self.out_channels * self.kernel_size * self.kernel_size
    }
}

#[derive(Debug, Clone)]
pub struct Conv2d {
    config: Conv2dConfig,
    weight: Var,
    bias: Option<Var>,
}

impl Conv2d {
    pub fn new(config: Conv2dConfig, weight: Var, bias: Option<Var>) -> Result<Self> {
        if config.in_channels == 0 || config.out_channels == 0 || config.kernel_size == 0 {
            return Err(Error::Msg(format!(
                "conv2d channels and kernel size must be non-zero: {config:?}"
            )));
        }
        if config.stride == 0 {
            return Err(Error::Msg("conv2d stride must be non-zero".into()));
        }
        checks::expect_shape(
            "conv2d.weight",
            weight.as_tensor(),
            &[
                config.out_channels,
                config.in_channels,
                config.kernel_size,
                config.kernel_size,
            ],
        )?;
        checks::expect_dtype_in("conv2d.weight", weight.as_tensor(), &[DType::F32])?;
        match (config.bias, bias.as_ref()) {
            (true, Some(bias)) => {
                checks::expect_shape("conv2d.bias", bias.as_tensor(), &[config.out_channels])?
            }
            (false, None) => {}
            (true, None) => return Err(Error::Msg("conv2d config expects a bias".into())),
            (false, Some(_)) => {
                return Err(Error::Msg("bias provided but conv2d config disables bias".into()))
            }
        }
        Ok(Self {
            config,
            weight,
            bias,
        })
    }

    /// Samples the kernel from `init`; the bias starts at zero.
    pub fn with_init(config: Conv2dConfig, init: &ParamInit, device: &Device) -> Result<Self> {
        let weight = init.sample_var(
            (
                config.out_channels,
                config.in_channels,
                config.kernel_size,
                config.kernel_size,
            ),
            config.fan_in(),
            config.fan_out(),
            device,
        )?;
        let bias = if config.bias {
            Some(Var::zeros(config.out_channels, DType::F32, device)?)
        } else {
            None
        };
        Self::new(config, weight, bias)
    }

    pub fn from_tensors(config: Conv2dConfig, weight: &Tensor, bias: Option<&Tensor>) -> Result<Self> {
        let weight = Var::from_tensor(weight)?;
        let bias = bias.map(Var::from_tensor).transpose()?;
        Self::new(config, weight, bias)
    }

    pub fn config(&self) -> &Conv2dConfig {
        &self.config
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = vec![(format!("{scope}.weight"), self.weight.clone())];
        if let Some(bias) = &self.bias {
            params.push((format!("{scope}.bias"), bias.clone()));
        }
        params
    }

    /// Convolves `input` shaped `(batch, in_channels, height, width)`.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        checks::expect_nchw("conv2d.input", input, self.config.in_channels)?;
        let output = input.conv2d(
            self.weight.as_tensor(),
            self.config.padding,
            self.config.stride,
            1,
            1,
        )?;
        match &self.bias {
            Some(bias) => {
                let bias = bias.as_tensor().reshape((1, self.config.out_channels, 1, 1))?;
                output.broadcast_add(&bias)
            }
            None => Ok(output),
        }
    }
}
