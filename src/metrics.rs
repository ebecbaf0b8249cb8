//! Per-batch scalars and their per-epoch aggregation.

use crate::dataset::Split;
use std::fmt;
use std::sync::Mutex;

/// Scalars produced by scoring one batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepMetrics {
    pub loss: f32,
    /// Batch-mean SNR in dB.
    pub snr: f32,
}

impl StepMetrics {
    pub fn is_finite(&self) -> bool {
        self.loss.is_finite() && self.snr.is_finite()
    }
}

/// Running means over the batches of one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpochReport {
    loss_sum: f64,
    snr_sum: f64,
    steps: usize,
}

impl EpochReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, m: StepMetrics) {
        self.loss_sum += m.loss as f64;
        self.snr_sum += m.snr as f64;
        self.steps += 1;
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Mean of every recorded batch; `None` before the first one.
    pub fn mean(&self) -> Option<StepMetrics> {
        if self.steps == 0 {
            return None;
        }
        let n = self.steps as f64;
        Some(StepMetrics {
            loss: (self.loss_sum / n) as f32,
            snr: (self.snr_sum / n) as f32,
        })
    }

    /// Whether any recorded loss or SNR was NaN or infinite.
    pub fn has_non_finite(&self) -> bool {
        !self.loss_sum.is_finite() || !self.snr_sum.is_finite()
    }
}

impl fmt::Display for EpochReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mean() {
            Some(m) => write!(f, "loss={:.6} SNR={:.3} batches={}", m.loss, m.snr, self.steps),
            None => write!(f, "batches=0"),
        }
    }
}

/// Receives the scalars of every scored batch.
pub trait MetricsSink: Send + Sync {
    fn record(&self, phase: Split, step: usize, metrics: StepMetrics);
}

/// Forwards every record to the `log` facade at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl MetricsSink for LogSink {
    fn record(&self, phase: Split, step: usize, m: StepMetrics) {
        log::debug!("{phase} step {step}: loss={:.6} SNR={:.3}", m.loss, m.snr);
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(Split, usize, StepMetrics)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(Split, usize, StepMetrics)> {
        match self.records.lock() {
            Ok(r) => r.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, phase: Split) -> usize {
        self.records().iter().filter(|(p, _, _)| *p == phase).count()
    }
}

impl MetricsSink for MemorySink {
    fn record(&self, phase: Split, step: usize, metrics: StepMetrics) {
        let mut records = match self.records.lock() {
            Ok(r) => r,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.push((phase, step, metrics));
    }
}
