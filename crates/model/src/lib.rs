//! COVID-19 classifiers for chest CT scans and radiographs.
//!
//! [`SequenceClassifier`] treats a CT scan as a sequence of slices: a shared
//! convolutional backbone embeds every slice, an LSTM runs over the
//! embeddings and either a flatten or an attention aggregation reduces the
//! hidden states before a dense [`ClassificationHead`]. [`SliceClassifier`]
//! classifies single images with spatial attention pooling.
//!
//! Models are configured through [`ClassifierConfig`], which loads from TOML
//! or JSON. All tensors are `f32`.

pub mod aggregation;
pub mod backbone;
pub mod config;
pub mod encoder;
pub mod error;
pub mod head;
pub mod prediction;
pub mod sequence;
pub mod slice;

pub use aggregation::{
    Aggregated, Aggregation, AttentionAggregation, FlattenAggregation, GateSource,
    TemporalAggregator,
};
pub use backbone::{ConvBackbone, EmbeddingExtractor};
pub use config::{
    AggregationKind, BackboneConfig, ClassifierConfig, GateKind, InitConfig, SequenceConfig,
    SliceConfig,
};
pub use encoder::SequenceEncoder;
pub use error::ModelError;
pub use head::ClassificationHead;
pub use prediction::{log_probabilities, predict, probabilities, ClassScheme};
pub use sequence::{SequenceClassifier, SequenceOutput};
pub use slice::{SliceClassifier, SliceOutput};
