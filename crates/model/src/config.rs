//! Classifier configuration.
//!
//! Configurations load from TOML (default) or JSON files. Every field has a
//! default matching the CT slice-sequence experiments: sixteen slices per
//! scan, a 128-wide LSTM and three output classes.

use std::{fs, path::Path};

use layers::ParamInit;
use serde::Deserialize;

use crate::error::ModelError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,
    #[serde(default)]
    pub backbone: BackboneConfig,
    #[serde(default)]
    pub sequence: SequenceConfig,
    #[serde(default)]
    pub slice: SliceConfig,
    #[serde(default)]
    pub init: InitConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            num_classes: default_num_classes(),
            backbone: BackboneConfig::default(),
            sequence: SequenceConfig::default(),
            slice: SliceConfig::default(),
            init: InitConfig::default(),
        }
    }
}

impl ClassifierConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: ClassifierConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | Some("tml") | None => toml::from_str(&contents)?,
            Some(other) => {
                return Err(ModelError::ConfigFormat(format!(
                    "unsupported configuration extension '{}'",
                    other
                )));
            }
        };
        config.validate()?;
        log::info!("loaded classifier config from {}", path.display());
        Ok(config)
    }

    /// Checks every section and reports all problems at once.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut errors = self.head_errors();
        errors.extend(self.backbone_errors());
        finish(errors)
    }

    /// Like [`ClassifierConfig::validate`] but skips the `backbone` and
    /// `slice` sections, for models built around an external extractor.
    pub fn validate_without_backbone(&self) -> Result<(), ModelError> {
        finish(self.head_errors())
    }

    fn backbone_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.backbone.input_channels == 0 {
            errors.push("backbone.input_channels must be greater than 0".to_string());
        }
        if self.backbone.stage_channels.is_empty() {
            errors.push("backbone.stage_channels must not be empty".to_string());
        }
        if self.backbone.stage_channels.iter().any(|&c| c == 0) {
            errors.push("backbone.stage_channels entries must be greater than 0".to_string());
        }
        if self.backbone.kernel_size == 0 || self.backbone.kernel_size % 2 == 0 {
            errors.push("backbone.kernel_size must be a positive odd number".to_string());
        }
        if let Some(stage) = self.slice.attention_stage {
            if stage >= self.backbone.stage_channels.len() {
                errors.push(format!(
                    "slice.attention_stage {} is out of range for {} backbone stages",
                    stage,
                    self.backbone.stage_channels.len()
                ));
            }
        }
        errors
    }

    fn head_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.num_classes < 2 {
            errors.push("num_classes must be at least 2".to_string());
        }

        if self.sequence.seq_len == 0 {
            errors.push("sequence.seq_len must be greater than 0".to_string());
        }
        if self.sequence.hidden_size == 0 {
            errors.push("sequence.hidden_size must be greater than 0".to_string());
        }
        if let Some(0) = self.sequence.attention_dim {
            errors.push("sequence.attention_dim must be greater than 0".to_string());
        }
        if self.sequence.aggregation == AggregationKind::Attention
            && self.sequence.gate == GateKind::FinalHidden
        {
            if let Some(dim) = self.sequence.attention_dim {
                if dim != self.sequence.hidden_size {
                    errors.push(format!(
                        "sequence.attention_dim ({}) must equal sequence.hidden_size ({}) when the final hidden state gates attention",
                        dim, self.sequence.hidden_size
                    ));
                }
            }
        }

        if ParamInit::from_name(&self.init.weights).is_none() {
            errors.push(format!("unknown init.weights policy '{}'", self.init.weights));
        }
        if ParamInit::from_name(&self.init.recurrent).is_none() {
            errors.push(format!(
                "unknown init.recurrent policy '{}'",
                self.init.recurrent
            ));
        }

        errors
    }
}

fn finish(errors: Vec<String>) -> Result<(), ModelError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ModelError::validation(errors))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BackboneConfig {
    #[serde(default = "default_input_channels")]
    pub input_channels: usize,
    /// Output channels of each `conv -> relu -> maxpool` stage.
    #[serde(default = "default_stage_channels")]
    pub stage_channels: Vec<usize>,
    #[serde(default = "default_kernel_size")]
    pub kernel_size: usize,
}

impl Default for BackboneConfig {
    fn default() -> Self {
        Self {
            input_channels: default_input_channels(),
            stage_channels: default_stage_channels(),
            kernel_size: default_kernel_size(),
        }
    }
}

impl BackboneConfig {
    /// Width of the embedding produced for each image.
    pub fn embedding_dim(&self) -> usize {
        self.stage_channels.last().copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    /// Concatenate every hidden state; ties the model to one sequence length.
    Flatten,
    /// Attention-pool the hidden states; any sequence length works.
    Attention,
}

impl Default for AggregationKind {
    fn default() -> Self {
        Self::Attention
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    /// A learned query vector shared by all sequences.
    Learned,
    /// The LSTM hidden state after the last slice.
    FinalHidden,
}

impl Default for GateKind {
    fn default() -> Self {
        Self::FinalHidden
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SequenceConfig {
    #[serde(default = "default_seq_len")]
    pub seq_len: usize,
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    #[serde(default)]
    pub aggregation: AggregationKind,
    #[serde(default)]
    pub gate: GateKind,
    /// Width of the attention keys; defaults to `hidden_size`.
    #[serde(default)]
    pub attention_dim: Option<usize>,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            seq_len: default_seq_len(),
            hidden_size: default_hidden_size(),
            aggregation: AggregationKind::default(),
            gate: GateKind::default(),
            attention_dim: None,
        }
    }
}

impl SequenceConfig {
    pub fn attention_dim(&self) -> usize {
        self.attention_dim.unwrap_or(self.hidden_size)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SliceConfig {
    /// Backbone stage whose feature map is attention-pooled; defaults to the
    /// stage before the last one.
    #[serde(default)]
    pub attention_stage: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InitConfig {
    #[serde(default = "default_weight_init")]
    pub weights: String,
    #[serde(default = "default_recurrent_init")]
    pub recurrent: String,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            weights: default_weight_init(),
            recurrent: default_recurrent_init(),
        }
    }
}

impl InitConfig {
    pub fn weights(&self) -> Result<ParamInit, ModelError> {
        resolve_init("init.weights", &self.weights)
    }

    pub fn recurrent(&self) -> Result<ParamInit, ModelError> {
        resolve_init("init.recurrent", &self.recurrent)
    }
}

fn resolve_init(label: &str, name: &str) -> Result<ParamInit, ModelError> {
    ParamInit::from_name(name).ok_or_else(|| {
        ModelError::validation(vec![format!("unknown {} policy '{}'", label, name)])
    })
}

fn default_num_classes() -> usize {
    3
}

fn default_input_channels() -> usize {
    3
}

fn default_stage_channels() -> Vec<usize> {
    vec![16, 32, 64, 128]
}

fn default_kernel_size() -> usize {
    3
}

fn default_seq_len() -> usize {
    16
}

fn default_hidden_size() -> usize {
    128
}

fn default_weight_init() -> String {
    "kaiming_uniform".to_string()
}

fn default_recurrent_init() -> String {
    "fan_in_uniform".to_string()
}
