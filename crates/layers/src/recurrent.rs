//! Single-layer LSTM over batch-major sequences.
//!
//! Inputs are shaped `(batch, seq, input_dim)`. Gates are packed in the
//! conventional `input, forget, cell, output` order along the first weight
//! axis, so `w_ih` is `(4 * hidden, input_dim)` and `w_hh` is
//! `(4 * hidden, hidden)`. The state starts at zero for every sequence.

use candle_core::{DType, Device, Error, Result, Tensor, Var};
use candle_nn::ops::sigmoid;

use crate::{checks, init::ParamInit};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LstmConfig {
    pub input_dim: usize,
    pub hidden_dim: usize,
}

impl LstmConfig {
    pub fn new(input_dim: usize, hidden_dim: usize) -> Self {
        Self {
            input_dim,
            hidden_dim,
        }
    }

    fn gate_dim(&self) -> usize {
        4 * self.hidden_dim
    }
}

/// Everything an LSTM pass produces.
#[derive(Debug, Clone)]
pub struct LstmOutput {
    /// Hidden state at every position, `(batch, seq, hidden)`.
    pub hidden_states: Tensor,
    /// Hidden state after the last position, `(batch, hidden)`.
    pub final_hidden: Tensor,
    /// Cell state after the last position, `(batch, hidden)`.
    pub final_cell: Tensor,
}

#[derive(Debug, Clone)]
pub struct Lstm {
    config: LstmConfig,
    w_ih: Var,
    w_hh: Var,
    b_ih: Var,
    b_hh: Var,
}

impl Lstm {
    pub fn new(config: LstmConfig, w_ih: Var, w_hh: Var, b_ih: Var, b_hh: Var) -> Result<Self> {
        if config.input_dim == 0 || config.hidden_dim == 0 {
            return Err(Error::Msg(format!(
                "lstm dimensions must be non-zero: {config:?}"
            )));
        }
        let gates = config.gate_dim();
        checks::expect_shape("lstm.w_ih", w_ih.as_tensor(), &[gates, config.input_dim])?;
        checks::expect_shape("lstm.w_hh", w_hh.as_tensor(), &[gates, config.hidden_dim])?;
        checks::expect_shape("lstm.b_ih", b_ih.as_tensor(), &[gates])?;
        checks::expect_shape("lstm.b_hh", b_hh.as_tensor(), &[gates])?;
        Ok(Self {
            config,
            w_ih,
            w_hh,
            b_ih,
            b_hh,
        })
    }

    /// Samples every weight and bias from `init`.
    ///
    /// [`ParamInit::FanInUniform`] uses `1 / sqrt(hidden_dim)` for every
    /// tensor, the usual recurrent default. Other policies see the true fan-in
    /// of each weight matrix.
    pub fn with_init(config: LstmConfig, init: &ParamInit, device: &Device) -> Result<Self> {
        let gates = config.gate_dim();
        let hidden = config.hidden_dim;
        let input_fan = match init {
            ParamInit::FanInUniform => hidden,
            _ => config.input_dim,
        };
        let w_ih = init.sample_var((gates, config.input_dim), input_fan, gates, device)?;
        let w_hh = init.sample_var((gates, hidden), hidden, gates, device)?;
        let b_ih = init.sample_var(gates, hidden, gates, device)?;
        let b_hh = init.sample_var(gates, hidden, gates, device)?;
        Self::new(config, w_ih, w_hh, b_ih, b_hh)
    }

    pub fn from_tensors(
        config: LstmConfig,
        w_ih: &Tensor,
        w_hh: &Tensor,
        b_ih: &Tensor,
        b_hh: &Tensor,
    ) -> Result<Self> {
        Self::new(
            config,
            Var::from_tensor(w_ih)?,
            Var::from_tensor(w_hh)?,
            Var::from_tensor(b_ih)?,
            Var::from_tensor(b_hh)?,
        )
    }

    pub fn config(&self) -> &LstmConfig {
        &self.config
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        vec![
            (format!("{scope}.w_ih"), self.w_ih.clone()),
            (format!("{scope}.w_hh"), self.w_hh.clone()),
            (format!("{scope}.b_ih"), self.b_ih.clone()),
            (format!("{scope}.b_hh"), self.b_hh.clone()),
        ]
    }

    /// Runs the recurrence over `input` shaped `(batch, seq, input_dim)`.
    pub fn forward(&self, input: &Tensor) -> Result<LstmOutput> {
        checks::expect_batch_seq_hidden("lstm.input", input, self.config.input_dim)?;
        let (batch, seq, _) = input.dims3()?;
        let hidden = self.config.hidden_dim;
        let gates = self.config.gate_dim();

        // Input contributions for all positions in one matmul.
        let bias = self.b_ih.as_tensor().add(self.b_hh.as_tensor())?;
        let projected = input
            .reshape((batch * seq, self.config.input_dim))?
            .matmul(&self.w_ih.as_tensor().t()?)?
            .broadcast_add(&bias)?
            .reshape((batch, seq, gates))?;
        let w_hh_t = self.w_hh.as_tensor().t()?;

        let mut h = Tensor::zeros((batch, hidden), DType::F32, input.device())?;
        let mut c = h.clone();
        let mut states = Vec::with_capacity(seq);
        for step in 0..seq {
            let gates = projected
                .narrow(1, step, 1)?
                .squeeze(1)?
                .add(&h.matmul(&w_hh_t)?)?;
            let squashed = sigmoid(&gates)?.chunk(4, 1)?;
            let candidate = gates.narrow(1, 2 * hidden, hidden)?.tanh()?;
            let (input_gate, forget_gate, output_gate) =
                (&squashed[0], &squashed[1], &squashed[3]);

            c = forget_gate.mul(&c)?.add(&input_gate.mul(&candidate)?)?;
            h = output_gate.mul(&c.tanh()?)?;
            states.push(h.clone());
        }

        Ok(LstmOutput {
            hidden_states: Tensor::stack(&states, 1)?,
            final_hidden: h,
            final_cell: c,
        })
    }
}
