//! Softmax attention pooling for sequences and spatial feature maps.
//!
//! [`LinearAttention1d`] reduces `(batch, len, features)` sequences to one
//! vector per sample; [`LinearAttention2d`] reduces `(batch, channels, h, w)`
//! maps. Both return the normalised weights alongside the pooled vector so
//! callers can inspect which positions drove a prediction.
//!
//! All computation happens in `f32`. Inputs whose shapes disagree with the
//! layer configuration are rejected with [`AttentionError::ShapeMismatch`];
//! nothing is broadcast or truncated implicitly.

pub mod core;
pub mod linear;

pub use crate::core::{AttentionConfig, AttentionError, AttentionOutput, AttentionPool};
pub use linear::{LinearAttention1d, LinearAttention2d};
