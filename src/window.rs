//! Analysis windows for the short-time Fourier transform.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::str::FromStr;

/// Periodic Hann window of length `n`.
pub fn hann(n: usize) -> Vec<f32> {
    cosine_sum(n, &[0.5, 0.5])
}

/// Periodic Hamming window of length `n`.
pub fn hamming(n: usize) -> Vec<f32> {
    cosine_sum(n, &[0.54, 0.46])
}

/// Periodic Blackman window of length `n`.
pub fn blackman(n: usize) -> Vec<f32> {
    cosine_sum(n, &[0.42, 0.5, 0.08])
}

// a0 - a1 cos(x) + a2 cos(2x) - ...
fn cosine_sum(n: usize, coeffs: &[f32]) -> Vec<f32> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![1.0];
    }
    let m = n as f32;
    (0..n)
        .map(|i| {
            let x = 2.0 * PI * i as f32 / m;
            coeffs
                .iter()
                .enumerate()
                .map(|(k, &a)| {
                    let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                    sign * a * (k as f32 * x).cos()
                })
                .sum()
        })
        .collect()
}

/// Window family used by the spectral transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    #[default]
    #[serde(alias = "hanning")]
    Hann,
    Hamming,
    Blackman,
}

impl WindowType {
    /// Build a window of this type with `n` samples.
    pub fn build(self, n: usize) -> Vec<f32> {
        match self {
            WindowType::Hann => hann(n),
            WindowType::Hamming => hamming(n),
            WindowType::Blackman => blackman(n),
        }
    }
}

impl FromStr for WindowType {
    type Err = crate::Error;

    fn from_str(name: &str) -> crate::Result<Self> {
        match name.to_lowercase().as_str() {
            "hann" | "hanning" => Ok(WindowType::Hann),
            "hamming" => Ok(WindowType::Hamming),
            "blackman" => Ok(WindowType::Blackman),
            _ => Err(crate::Error::UnknownVariant {
                kind: "window",
                name: name.to_string(),
                expected: "hann, hamming, blackman",
            }),
        }
    }
}

/// Sum of squared window values for overlap-add of `n_frames` frames.
///
/// The result has length `(n_frames - 1) * hop_length + window.len()` and is
/// the normaliser used by the inverse transform. Positions where it is zero
/// cannot be reconstructed.
pub fn window_sumsquare(window: &[f32], n_frames: usize, hop_length: usize) -> Vec<f32> {
    if window.is_empty() || n_frames == 0 || hop_length == 0 {
        return Vec::new();
    }
    let out_len = (n_frames - 1) * hop_length + window.len();
    let mut wss = vec![0.0f32; out_len];
    for frame_idx in 0..n_frames {
        let offset = frame_idx * hop_length;
        for (i, &w) in window.iter().enumerate() {
            wss[offset + i] += w * w;
        }
    }
    wss
}
