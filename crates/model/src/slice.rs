//! Single-image classifier with spatial attention pooling.

use attention::{AttentionConfig, AttentionPool, LinearAttention2d};
use candle_core::{Device, Tensor, Var};

use crate::{
    backbone::{replicate_channels, ConvBackbone, EmbeddingExtractor},
    config::ClassifierConfig,
    error::ModelError,
    head::ClassificationHead,
};

/// Logits plus the spatial attention map of a slice classifier.
#[derive(Debug, Clone)]
pub struct SliceOutput {
    /// `(batch, num_classes)`.
    pub logits: Tensor,
    /// `(batch, 1, h, w)` over the attended stage's grid.
    pub attention_map: Tensor,
}

/// Classifies single slices or radiographs with spatial attention.
///
/// The feature map of one backbone stage is attention-pooled, gated by the
/// global embedding of the last stage broadcast over that map's grid. When
/// the two stages differ in width the gate is projected by the attention
/// layer.
#[derive(Debug)]
pub struct SliceClassifier {
    config: ClassifierConfig,
    backbone: ConvBackbone,
    attention_stage: usize,
    attention: LinearAttention2d,
    head: ClassificationHead,
}

impl SliceClassifier {
    pub fn new(config: ClassifierConfig, device: &Device) -> Result<Self, ModelError> {
        config.validate()?;
        let weight_init = config.init.weights()?;
        let backbone = ConvBackbone::new(&config.backbone, &weight_init, device)?;

        let last = backbone.num_stages() - 1;
        let attention_stage = config
            .slice
            .attention_stage
            .unwrap_or_else(|| last.saturating_sub(1));
        let (local, global) = match (
            backbone.stage_channels(attention_stage),
            backbone.stage_channels(last),
        ) {
            (Some(local), Some(global)) => (local, global),
            _ => {
                return Err(ModelError::validation(vec![format!(
                    "slice.attention_stage {attention_stage} is out of range"
                )]))
            }
        };

        let attention = LinearAttention2d::new(
            &AttentionConfig::new(global, local).with_init(weight_init.clone()),
            device,
        )?;
        let head = ClassificationHead::new(local, config.num_classes, &weight_init, device)?;

        log::info!(
            "model::slice init attention_stage={} local_channels={} gate_channels={} projected={} classes={}",
            attention_stage,
            local,
            global,
            attention.is_projected(),
            config.num_classes
        );
        Ok(Self {
            config,
            backbone,
            attention_stage,
            attention,
            head,
        })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn attention_stage(&self) -> usize {
        self.attention_stage
    }

    /// Classifies `(batch, height, width)` single-channel images.
    pub fn forward(&self, images: &Tensor) -> Result<SliceOutput, ModelError> {
        let (batch, height, width) = match images.dims() {
            [b, h, w] => (*b, *h, *w),
            dims => {
                return Err(ModelError::shape(format!(
                    "slice classifier expects (batch, height, width), got {dims:?}"
                )))
            }
        };
        let images = replicate_channels(
            &images.reshape((batch, 1, height, width))?,
            self.backbone.config().input_channels,
        )?;

        let maps = self.backbone.stage_maps(&images)?;
        let local = maps.get(self.attention_stage).ok_or_else(|| {
            ModelError::shape(format!("backbone has no stage {}", self.attention_stage))
        })?;
        let global = maps
            .last()
            .ok_or_else(|| ModelError::shape("backbone produced no feature maps"))?
            .mean((2, 3))?;

        let (_, _, grid_h, grid_w) = local.dims4()?;
        let global_channels = global.dim(1)?;
        let gate = global
            .reshape((batch, global_channels, 1, 1))?
            .broadcast_as((batch, global_channels, grid_h, grid_w))?
            .contiguous()?;

        let pooled = self.attention.attend(local, &gate)?;
        let logits = self.head.forward(&pooled.pooled)?;
        Ok(SliceOutput {
            logits,
            attention_map: pooled.weights,
        })
    }

    pub fn named_parameters(&self) -> Vec<(String, Var)> {
        let mut params = self.backbone.named_parameters("backbone");
        params.extend(self.attention.named_parameters("attention"));
        params.extend(self.head.named_parameters("head"));
        params
    }
}
