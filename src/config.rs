//! Hyper-parameters.

use crate::nn::encoder::EncoderKind;
use crate::nn::optim::OptimizerKind;
use crate::separation::EstimatorKind;
use crate::spectrum::StftConfig;
use crate::window::WindowType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest supported source count; the permutation search is `N!`.
pub const MAX_SOURCES: usize = 8;

/// Every tunable of the model, the transform and the training loop.
///
/// Missing fields in a JSON file take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HParams {
    /// Target sample rate; inputs at other rates are resampled.
    pub sample_rate: u32,
    pub fft_size: usize,
    pub fft_stride: usize,
    pub window: WindowType,
    pub center: bool,
    /// Dimension of each time-frequency embedding.
    pub embed_size: usize,
    /// Source slots per example.
    pub max_n_signal: usize,
    pub batch_size: usize,
    pub encoder: EncoderKind,
    pub hidden_size: usize,
    pub train_estimator: EstimatorKind,
    pub infer_estimator: EstimatorKind,
    pub optimizer: OptimizerKind,
    pub learning_rate: f64,
    /// Multiplicative learning-rate decay applied after every epoch.
    pub lr_decay: f64,
    pub weight_decay: f64,
    /// Element-wise gradient clipping threshold.
    pub grad_clip: Option<f64>,
    pub dropout_keep_prob: f32,
    /// Consecutive NaN rollbacks tolerated before the run aborts.
    pub max_nan_retries: usize,
}

impl Default for HParams {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            fft_size: 256,
            fft_stride: 64,
            window: WindowType::Hann,
            center: false,
            embed_size: 20,
            max_n_signal: 2,
            batch_size: 32,
            encoder: EncoderKind::Lstm,
            hidden_size: 300,
            train_estimator: EstimatorKind::Anchor,
            infer_estimator: EstimatorKind::Anchor,
            optimizer: OptimizerKind::Adam,
            learning_rate: 3e-4,
            lr_decay: 1.0,
            weight_decay: 0.0,
            grad_clip: Some(100.0),
            dropout_keep_prob: 1.0,
            max_nan_retries: 3,
        }
    }
}

impl HParams {
    /// Load hyper-parameters from a JSON file and validate them.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let hparams: HParams = serde_json::from_str(&text)?;
        hparams.validate()?;
        Ok(hparams)
    }

    /// Frequency bins per frame, `fft_size / 2 + 1`.
    pub fn feature_size(&self) -> usize {
        self.fft_size / 2 + 1
    }

    pub fn stft_config(&self) -> StftConfig {
        StftConfig::new(self.fft_size, self.fft_stride, self.window, self.center)
    }

    /// Whether training and inference share one attractor estimator.
    pub fn same_estimator(&self) -> bool {
        self.train_estimator == self.infer_estimator
    }

    pub fn validate(&self) -> crate::Result<()> {
        let sizes = [
            ("sample_rate", self.sample_rate as usize),
            ("fft_size", self.fft_size),
            ("fft_stride", self.fft_stride),
            ("embed_size", self.embed_size),
            ("batch_size", self.batch_size),
            ("hidden_size", self.hidden_size),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(crate::Error::InvalidSize {
                    name,
                    value,
                    reason: "must be > 0",
                });
            }
        }
        if self.fft_stride > self.fft_size {
            return Err(crate::Error::InvalidSize {
                name: "fft_stride",
                value: self.fft_stride,
                reason: "must not exceed fft_size",
            });
        }
        if !(1..=MAX_SOURCES).contains(&self.max_n_signal) {
            return Err(crate::Error::InvalidSize {
                name: "max_n_signal",
                value: self.max_n_signal,
                reason: "must be in 1..=8",
            });
        }
        if !(self.dropout_keep_prob > 0.0 && self.dropout_keep_prob <= 1.0) {
            return Err(crate::Error::InvalidParameter {
                name: "dropout_keep_prob",
                value: self.dropout_keep_prob.to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(crate::Error::InvalidParameter {
                name: "learning_rate",
                value: self.learning_rate.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if let Some(clip) = self.grad_clip
            && clip <= 0.0
        {
            return Err(crate::Error::InvalidParameter {
                name: "grad_clip",
                value: clip.to_string(),
                reason: "must be positive when set".to_string(),
            });
        }
        Ok(())
    }
}
