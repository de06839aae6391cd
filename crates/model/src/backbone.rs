//! Per-image embedding extractors.
//!
//! The sequence model only needs something that turns a batch of images into
//! one vector per image; [`EmbeddingExtractor`] is that seam. [`ConvBackbone`]
//! is the built-in implementation.

use candle_core::{Device, Tensor, Var};
use layers::{Conv2d, Conv2dConfig, ParamInit};

use crate::{config::BackboneConfig, error::ModelError};

/// Maps images `(batch, channels, height, width)` to embeddings `(batch, dim)`.
pub trait EmbeddingExtractor: Send + Sync {
    /// Channel count the extractor expects on its input.
    fn input_channels(&self) -> usize;

    /// Width of each embedding.
    fn embedding_dim(&self) -> usize;

    fn forward(&self, images: &Tensor) -> Result<Tensor, ModelError>;

    fn named_parameters(&self, scope: &str) -> Vec<(String, Var)>;
}

/// Stack of `conv -> relu -> 2x2 max-pool` stages followed by global average pooling.
#[derive(Debug, Clone)]
pub struct ConvBackbone {
    config: BackboneConfig,
    stages: Vec<Conv2d>,
}

impl ConvBackbone {
    pub fn new(
        config: &BackboneConfig,
        init: &ParamInit,
        device: &Device,
    ) -> Result<Self, ModelError> {
        if config.stage_channels.is_empty() {
            return Err(ModelError::validation(vec![
                "backbone.stage_channels must not be empty".to_string(),
            ]));
        }
        let mut stages = Vec::with_capacity(config.stage_channels.len());
        let mut in_channels = config.input_channels;
        for &out_channels in &config.stage_channels {
            let conv_config = Conv2dConfig::same(in_channels, out_channels, config.kernel_size);
            stages.push(Conv2d::with_init(conv_config, init, device)?);
            in_channels = out_channels;
        }
        log::debug!(
            "conv backbone stages={:?} kernel={} embedding_dim={}",
            config.stage_channels,
            config.kernel_size,
            config.embedding_dim()
        );
        Ok(Self {
            config: config.clone(),
            stages,
        })
    }

    pub fn config(&self) -> &BackboneConfig {
        &self.config
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    /// Output channels of stage `index`.
    pub fn stage_channels(&self, index: usize) -> Option<usize> {
        self.config.stage_channels.get(index).copied()
    }

    /// Feature map after every stage; each halves the spatial size.
    pub fn stage_maps(&self, images: &Tensor) -> Result<Vec<Tensor>, ModelError> {
        let mut hidden = images.clone();
        let mut maps = Vec::with_capacity(self.stages.len());
        for (index, conv) in self.stages.iter().enumerate() {
            let activated = conv.forward(&hidden)?.relu()?;
            let (_, _, height, width) = activated.dims4()?;
            if height < 2 || width < 2 {
                return Err(ModelError::shape(format!(
                    "backbone stage {index} receives a {height}x{width} map, too small to pool"
                )));
            }
            hidden = activated.max_pool2d(2)?;
            maps.push(hidden.clone());
        }
        Ok(maps)
    }
}

impl EmbeddingExtractor for ConvBackbone {
    fn input_channels(&self) -> usize {
        self.config.input_channels
    }

    fn embedding_dim(&self) -> usize {
        self.config.embedding_dim()
    }

    fn forward(&self, images: &Tensor) -> Result<Tensor, ModelError> {
        let maps = self.stage_maps(images)?;
        let last = maps
            .last()
            .ok_or_else(|| ModelError::shape("backbone produced no feature maps"))?;
        Ok(last.mean((2, 3))?)
    }

    fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        self.stages
            .iter()
            .enumerate()
            .flat_map(|(index, conv)| conv.named_parameters(&format!("{scope}.stage{index}")))
            .collect()
    }
}

/// Repeats a single-channel batch `(n, 1, h, w)` to `channels` channels.
pub(crate) fn replicate_channels(images: &Tensor, channels: usize) -> Result<Tensor, ModelError> {
    let (n, c, h, w) = images.dims4()?;
    if c != 1 {
        return Err(ModelError::shape(format!(
            "expected single-channel images, got {c} channels"
        )));
    }
    if channels == 1 {
        return Ok(images.clone());
    }
    Ok(images.broadcast_as((n, channels, h, w))?.contiguous()?)
}
