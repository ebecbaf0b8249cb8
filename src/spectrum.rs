//! Short-time Fourier analysis and overlap-add synthesis.
//!
//! Spectrograms are laid out `(time, frequency)`: one row per frame, one
//! column per bin, matching the layout consumed by the embedding network.

use crate::fft::RealFftPlan;
use crate::window::{self, WindowType};
use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};
use num_complex::Complex32;

#[derive(Debug, Clone)]
pub struct StftConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    /// Pad `n_fft / 2` zeros on both sides before framing.
    pub center: bool,
    pub window: Vec<f32>,
}

impl Default for StftConfig {
    fn default() -> Self {
        Self::new(256, 64, WindowType::Hann, false)
    }
}

impl StftConfig {
    pub fn new(n_fft: usize, hop_length: usize, window: WindowType, center: bool) -> Self {
        Self {
            n_fft,
            hop_length,
            center,
            window: window.build(n_fft),
        }
    }

    /// Number of frequency bins, `n_fft / 2 + 1`.
    pub fn n_freq(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of frames produced for a signal of `len` samples.
    ///
    /// Without centering this is `ceil((len - n_fft) / hop) + 1`, with the
    /// tail zero-padded up to the last full frame; a signal shorter than
    /// one frame yields a single frame.
    pub fn n_frames(&self, len: usize) -> usize {
        let len = if self.center { len + 2 * (self.n_fft / 2) } else { len };
        if len <= self.n_fft {
            1
        } else {
            (len - self.n_fft).div_ceil(self.hop_length) + 1
        }
    }

    fn check(&self) -> crate::Result<()> {
        if self.n_fft == 0 {
            return Err(crate::Error::InvalidSize {
                name: "n_fft",
                value: 0,
                reason: "must be > 0",
            });
        }
        if self.hop_length == 0 || self.hop_length > self.n_fft {
            return Err(crate::Error::InvalidSize {
                name: "hop_length",
                value: self.hop_length,
                reason: "must be in 1..=n_fft",
            });
        }
        if self.window.len() != self.n_fft {
            return Err(crate::Error::shape(
                format!("window of {} samples", self.n_fft),
                self.window.len(),
            ));
        }
        Ok(())
    }
}

fn padded_signal(y: &[f32], config: &StftConfig, n_frames: usize) -> Vec<f32> {
    let lead = if config.center { config.n_fft / 2 } else { 0 };
    let total = (n_frames - 1) * config.hop_length + config.n_fft;
    let mut out = vec![0.0f32; total.max(lead + y.len())];
    out[lead..lead + y.len()].copy_from_slice(y);
    out
}

#[inline]
fn analyze_frame(
    frame: usize,
    padded: &[f32],
    config: &StftConfig,
    fft: &RealFftPlan,
) -> crate::Result<Vec<Complex32>> {
    let start = frame * config.hop_length;
    let buffer: Vec<f32> = padded[start..start + config.n_fft]
        .iter()
        .zip(config.window.iter())
        .map(|(&s, &w)| s * w)
        .collect();
    fft.forward(&buffer)
}

/// Compute the complex spectrogram of a waveform.
///
/// # Returns
/// Complex matrix of shape `(n_frames, n_fft / 2 + 1)`.
///
/// # Errors
/// Returns an error if the waveform is empty or non-finite, or if the
/// configuration is inconsistent.
pub fn analyze(y: &[f32], config: &StftConfig) -> crate::Result<Array2<Complex32>> {
    crate::utils::valid_audio(y)?;
    config.check()?;

    let n_frames = config.n_frames(y.len());
    let n_freq = config.n_freq();
    let padded = padded_signal(y, config, n_frames);
    let fft = RealFftPlan::new(config.n_fft);

    let frames: Vec<Vec<Complex32>> = {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            (0..n_frames)
                .into_par_iter()
                .map(|frame| analyze_frame(frame, &padded, config, &fft))
                .collect::<crate::Result<_>>()?
        }
        #[cfg(not(feature = "parallel"))]
        {
            (0..n_frames)
                .map(|frame| analyze_frame(frame, &padded, config, &fft))
                .collect::<crate::Result<_>>()?
        }
    };

    let mut spec = Array2::<Complex32>::zeros((n_frames, n_freq));
    for (mut row, bins) in spec.axis_iter_mut(Axis(0)).zip(frames) {
        for (dst, src) in row.iter_mut().zip(bins) {
            *dst = src;
        }
    }
    Ok(spec)
}

/// Reconstruct a waveform from a complex spectrogram by overlap-add.
///
/// Each frame is inverse transformed, windowed again, and accumulated; the
/// sum is divided by the overlapped squared window wherever that is nonzero.
///
/// # Arguments
/// * `spec` - Complex matrix `(n_frames, n_fft / 2 + 1)`
/// * `config` - The configuration used for analysis
/// * `length` - Optional output length (truncates or zero-extends)
pub fn synthesize(
    spec: ArrayView2<'_, Complex32>,
    config: &StftConfig,
    length: Option<usize>,
) -> crate::Result<Vec<f32>> {
    config.check()?;
    let (n_frames, n_freq) = spec.dim();
    if n_frames == 0 {
        return Err(crate::Error::InvalidSize {
            name: "spectrogram",
            value: 0,
            reason: "must contain at least one frame",
        });
    }
    if n_freq != config.n_freq() {
        return Err(crate::Error::shape(
            format!("{} frequency bins", config.n_freq()),
            n_freq,
        ));
    }

    let fft = RealFftPlan::new(config.n_fft);
    let wss = window::window_sumsquare(&config.window, n_frames, config.hop_length);
    let mut y = vec![0.0f32; wss.len()];

    for (frame, row) in spec.axis_iter(Axis(0)).enumerate() {
        let bins: Vec<Complex32> = row.iter().copied().collect();
        let samples = fft.inverse(&bins)?;
        let start = frame * config.hop_length;
        for (i, (&s, &w)) in samples.iter().zip(config.window.iter()).enumerate() {
            y[start + i] += s * w;
        }
    }

    for (v, &norm) in y.iter_mut().zip(wss.iter()) {
        if norm > 1e-8 {
            *v /= norm;
        }
    }

    let mut out = if config.center {
        y.split_off((config.n_fft / 2).min(y.len()))
    } else {
        y
    };
    if let Some(len) = length {
        out.resize(len, 0.0);
    }
    Ok(out)
}

/// Log-compressed magnitude, `ln(1 + |x|)`, of a complex array.
pub fn log_magnitude<D: ndarray::Dimension>(
    spec: &ndarray::Array<Complex32, D>,
) -> ndarray::Array<f32, D> {
    spec.mapv(|c| c.norm().ln_1p())
}

/// Phase angle, `atan2(im, re)`, of a complex array.
pub fn phase<D: ndarray::Dimension>(spec: &ndarray::Array<Complex32, D>) -> ndarray::Array<f32, D> {
    spec.mapv(|c| c.im.atan2(c.re))
}

/// Sum per-source spectrograms `(n_sources, time, freq)` into their mixture.
pub fn mixture(sources: &Array3<Complex32>) -> Array2<Complex32> {
    sources.sum_axis(Axis(0))
}

/// Combine a magnitude with a phase angle, `mag * exp(i * phase)`.
pub fn polar(magnitude: ArrayView2<'_, f32>, phase: ArrayView2<'_, f32>) -> Array2<Complex32> {
    let mut out = Array2::<Complex32>::zeros(magnitude.raw_dim());
    Zip::from(&mut out)
        .and(&magnitude)
        .and(&phase)
        .for_each(|o, &m, &p| *o = Complex32::from_polar(m, p));
    out
}
