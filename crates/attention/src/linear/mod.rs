//! Linear (softmax-normalised) attention pooling.
//!
//! Both layers compute a compatibility score per position from a learned,
//! bias-free linear map, turn the scores into one probability distribution per
//! sample with a max-subtracted softmax and pool the *input* with those
//! weights.

mod attention1d;
mod attention2d;

pub use attention1d::LinearAttention1d;
pub use attention2d::LinearAttention2d;
