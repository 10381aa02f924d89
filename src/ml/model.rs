use candle_core::{Result, Tensor};
use candle_nn::rnn::{lstm, LSTMConfig, LSTM};
use candle_nn::{linear, Dropout, Linear, Module, ModuleT, VarBuilder, RNN};
use serde::{Deserialize, Serialize};

/// Shape of the sequence-to-sequence network, persisted with the weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub look_back: usize,
    pub future_days: usize,
    pub hidden_units: usize,
    pub dropout: f32,
}

/// Encoder LSTM -> repeated final state -> decoder LSTM -> dropout -> per-day linear head
#[derive(Debug, Clone)]
pub struct Seq2SeqForecaster {
    encoder: LSTM,
    decoder: LSTM,
    dropout: Dropout,
    head: Linear,
    params: ModelParams,
}

impl Seq2SeqForecaster {
    pub fn new(params: ModelParams, vb: VarBuilder) -> Result<Self> {
        let encoder = lstm(1, params.hidden_units, LSTMConfig::default(), vb.pp("encoder"))?;
        let decoder = lstm(
            params.hidden_units,
            params.hidden_units,
            LSTMConfig::default(),
            vb.pp("decoder"),
        )?;
        let head = linear(params.hidden_units, 1, vb.pp("head"))?;

        Ok(Self {
            encoder,
            decoder,
            dropout: Dropout::new(params.dropout),
            head,
            params,
        })
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// `xs: (batch, look_back, 1)` -> `(batch, future_days)`
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let encoded = self.encoder.seq(xs)?;
        let last = encoded
            .last()
            .ok_or_else(|| candle_core::Error::Msg("empty input sequence".to_string()))?;

        // (batch, hidden) -> (batch, future_days, hidden)
        let repeated = last
            .h()
            .unsqueeze(1)?
            .repeat((1, self.params.future_days, 1))?;

        let decoded = self.decoder.seq(&repeated)?;
        let decoded = self.decoder.states_to_tensor(&decoded)?;
        let decoded = self.dropout.forward_t(&decoded, train)?;

        self.head.forward(&decoded)?.squeeze(2)
    }
}
