//! Embedding networks: mixture log-spectrogram in, one embedding vector per
//! time-frequency cell out.

use crate::nn::ParamRegistry;
use candle_core::{Module, Tensor};
use candle_nn::rnn::{LSTM, LSTMConfig, LSTMState, RNN};
use candle_nn::{Linear, ops};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Maps a mixture log-magnitude `[batch, time, freq]` to embeddings
/// `[batch, time, freq, embed]`.
pub trait EmbeddingNetwork {
    /// Run the network over a whole batch.
    ///
    /// Recurrent networks start from `state` and leave their final state in
    /// it; the caller decides when to [`RecurrentState::reset`].
    fn embed(&self, log_mixture: &Tensor, state: &mut RecurrentState, train: bool)
    -> crate::Result<Tensor>;

    fn embed_size(&self) -> usize;
}

/// Hidden and cell tensors carried between calls of a recurrent encoder.
///
/// Owned by whoever drives the batch loop. A reset state is equivalent to
/// all-zero hidden and cell tensors.
#[derive(Debug, Clone, Default)]
pub struct RecurrentState {
    lstm: Option<LSTMState>,
}

impl RecurrentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.lstm = None;
    }

    pub fn is_reset(&self) -> bool {
        self.lstm.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    /// Per-frame linear projection.
    Toy,
    #[default]
    Lstm,
}

impl FromStr for EncoderKind {
    type Err = crate::Error;

    fn from_str(name: &str) -> crate::Result<Self> {
        match name.to_lowercase().as_str() {
            "toy" => Ok(EncoderKind::Toy),
            "lstm" => Ok(EncoderKind::Lstm),
            _ => Err(crate::Error::UnknownVariant {
                kind: "encoder",
                name: name.to_string(),
                expected: "toy, lstm",
            }),
        }
    }
}

/// Build the encoder selected by `kind` under the `encoder` parameter block.
pub fn build(
    kind: EncoderKind,
    registry: &mut ParamRegistry,
    n_freq: usize,
    embed_size: usize,
    hidden_size: usize,
    dropout_keep_prob: f32,
) -> crate::Result<Box<dyn EmbeddingNetwork>> {
    Ok(match kind {
        EncoderKind::Toy => Box::new(ToyEncoder::new(registry, n_freq, embed_size)?),
        EncoderKind::Lstm => Box::new(LstmEncoder::new(
            registry,
            n_freq,
            embed_size,
            hidden_size,
            dropout_keep_prob,
        )?),
    })
}

fn check_input(log_mixture: &Tensor, n_freq: usize) -> crate::Result<(usize, usize)> {
    let (b, t, f) = log_mixture.dims3()?;
    if f != n_freq || t == 0 || b == 0 {
        return Err(crate::Error::shape(
            format!("[batch, time > 0, {n_freq}]"),
            log_mixture.dims(),
        ));
    }
    Ok((b, t))
}

pub struct ToyEncoder {
    proj: Linear,
    n_freq: usize,
    embed_size: usize,
}

impl ToyEncoder {
    pub fn new(registry: &mut ParamRegistry, n_freq: usize, embed_size: usize) -> crate::Result<Self> {
        let vb = registry.scope("encoder")?;
        let proj = candle_nn::linear(n_freq, n_freq * embed_size, vb.pp("proj"))?;
        Ok(Self {
            proj,
            n_freq,
            embed_size,
        })
    }
}

impl EmbeddingNetwork for ToyEncoder {
    fn embed(
        &self,
        log_mixture: &Tensor,
        _state: &mut RecurrentState,
        _train: bool,
    ) -> crate::Result<Tensor> {
        let (b, t) = check_input(log_mixture, self.n_freq)?;
        let out = self.proj.forward(log_mixture)?.tanh()?;
        Ok(out.reshape((b, t, self.n_freq, self.embed_size))?)
    }

    fn embed_size(&self) -> usize {
        self.embed_size
    }
}

/// LSTM over time followed by a projection of every hidden vector to
/// `freq * embed` values.
pub struct LstmEncoder {
    lstm: LSTM,
    proj: Linear,
    n_freq: usize,
    embed_size: usize,
    drop_prob: f32,
}

impl LstmEncoder {
    pub fn new(
        registry: &mut ParamRegistry,
        n_freq: usize,
        embed_size: usize,
        hidden_size: usize,
        dropout_keep_prob: f32,
    ) -> crate::Result<Self> {
        let vb = registry.scope("encoder")?;
        let lstm = candle_nn::lstm(n_freq, hidden_size, LSTMConfig::default(), vb.pp("lstm"))?;
        let proj = candle_nn::linear(hidden_size, n_freq * embed_size, vb.pp("proj"))?;
        Ok(Self {
            lstm,
            proj,
            n_freq,
            embed_size,
            drop_prob: 1.0 - dropout_keep_prob,
        })
    }
}

impl EmbeddingNetwork for LstmEncoder {
    fn embed(
        &self,
        log_mixture: &Tensor,
        state: &mut RecurrentState,
        train: bool,
    ) -> crate::Result<Tensor> {
        let (b, t) = check_input(log_mixture, self.n_freq)?;
        let init = match state.lstm.take() {
            Some(s) if s.h().dims2()?.0 == b => s,
            _ => self.lstm.zero_state(b)?,
        };
        let states = self.lstm.seq_init(log_mixture, &init)?;
        let hidden = self.lstm.states_to_tensor(&states)?;
        state.lstm = states.last().cloned();

        let hidden = if train && self.drop_prob > 0.0 {
            ops::dropout(&hidden, self.drop_prob)?
        } else {
            hidden
        };
        let out = self.proj.forward(&hidden)?.tanh()?;
        Ok(out.reshape((b, t, self.n_freq, self.embed_size))?)
    }

    fn embed_size(&self) -> usize {
        self.embed_size
    }
}
