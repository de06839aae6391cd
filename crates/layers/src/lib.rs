//! Building blocks with explicitly owned parameters.
//!
//! Each layer keeps its learned tensors as [`candle_core::Var`]s sampled by a
//! [`ParamInit`] policy at construction and lists them through
//! `named_parameters(scope)`, so optimizers and checkpoint code never rely on
//! implicit registration. Shapes are validated on entry and mismatches are
//! reported as `candle_core::Error::Msg` naming the offending tensor.

pub mod checks;
pub mod conv;
pub mod init;
pub mod linear;
pub mod recurrent;

pub use conv::{Conv2d, Conv2dConfig};
pub use init::ParamInit;
pub use linear::{Linear, LinearConfig};
pub use recurrent::{Lstm, LstmConfig, LstmOutput};
