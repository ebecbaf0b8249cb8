//! Waveform file I/O and sample-rate conversion.
//!
//! The separation core only ever sees in-memory waveforms and spectrograms;
//! this module is the single place that touches audio files.

use crate::config::HParams;
use crate::spectrum;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use ndarray::{Array2, ArrayView2};
use num_complex::Complex32;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("hound error: {0}")]
    Hound(#[from] hound::Error),
    #[error("resampling error: {0}")]
    Resample(String),
    #[error("file has no channels")]
    NoChannels,
}

/// Load a WAV file as a mono waveform.
///
/// Multi-channel files are averaged down to one channel. Integer samples
/// are scaled into `[-1, 1)`.
///
/// # Returns
/// `(samples, sample_rate)`
pub fn load_wav<P: AsRef<Path>>(path: P) -> crate::Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path).map_err(AudioError::Hound)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(AudioError::NoChannels.into());
    }

    let mut samples: Vec<f32> = Vec::new();
    match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => {
            for s in reader.samples::<f32>() {
                samples.push(s.map_err(AudioError::Hound)?);
            }
        }
        (SampleFormat::Int, bits) if bits <= 16 => {
            let scale = (1i32 << (bits - 1)) as f32;
            for s in reader.samples::<i16>() {
                samples.push(s.map_err(AudioError::Hound)? as f32 / scale);
            }
        }
        (SampleFormat::Int, bits) => {
            let scale = (1i64 << (bits - 1)) as f32;
            for s in reader.samples::<i32>() {
                samples.push(s.map_err(AudioError::Hound)? as f32 / scale);
            }
        }
    }

    let mono = if channels == 1 {
        samples
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    Ok((mono, spec.sample_rate))
}

/// Save a mono waveform as 16-bit PCM. Samples are clipped to `[-1, 1]`.
pub fn save_wav<P: AsRef<Path>>(path: P, data: &[f32], sample_rate: u32) -> crate::Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).map_err(AudioError::Hound)?;
    for &sample in data {
        let s = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(s).map_err(AudioError::Hound)?;
    }
    writer.finalize().map_err(AudioError::Hound)?;
    Ok(())
}

/// Resample a mono waveform from `src_sr` to `dst_sr`.
///
/// The output has exactly `ceil(len * dst_sr / src_sr)` samples.
pub fn resample(data: &[f32], src_sr: u32, dst_sr: u32) -> crate::Result<Vec<f32>> {
    if src_sr == 0 || dst_sr == 0 {
        return Err(crate::Error::InvalidParameter {
            name: "sample_rate",
            value: format!("{src_sr} -> {dst_sr}"),
            reason: "must be > 0".to_string(),
        });
    }
    if src_sr == dst_sr || data.is_empty() {
        return Ok(data.to_vec());
    }

    let ratio = dst_sr as f64 / src_sr as f64;
    let chunk_size = 1024usize;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    let mut output: Vec<f32> = Vec::new();
    for chunk in data.chunks(chunk_size) {
        let mut buf = vec![0.0f32; chunk_size];
        buf[..chunk.len()].copy_from_slice(chunk);
        let out = resampler
            .process(&[buf], None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        output.extend_from_slice(&out[0]);
    }

    let expected = (data.len() as f64 * ratio).ceil() as usize;
    Ok(crate::utils::fix_length(&output, expected))
}

/// Load a mixture file and return its spectrogram at the configured rate.
///
/// # Errors
/// `Error::MissingInput` when no path is given; audio and transform errors
/// otherwise.
pub fn load_wavfile(path: Option<&Path>, hparams: &HParams) -> crate::Result<Array2<Complex32>> {
    let path = path.ok_or(crate::Error::MissingInput {
        what: "WAV file",
        flag: "--input-file",
    })?;
    let (data, sample_rate) = load_wav(path)?;
    let data = if sample_rate != hparams.sample_rate {
        log::debug!(
            "resampling {} from {sample_rate} Hz to {} Hz",
            path.display(),
            hparams.sample_rate
        );
        resample(&data, sample_rate, hparams.sample_rate)?
    } else {
        data
    };
    spectrum::analyze(&data, &hparams.stft_config())
}

/// Inverse-transform a spectrogram and write it at the configured rate.
pub fn save_wavfile<P: AsRef<Path>>(
    path: P,
    spec: ArrayView2<'_, Complex32>,
    hparams: &HParams,
) -> crate::Result<()> {
    let data = spectrum::synthesize(spec, &hparams.stft_config(), None)?;
    save_wav(path, &data, hparams.sample_rate)
}

/// Generate a pure tone.
pub fn tone(frequency: f32, sr: u32, duration: f32) -> Vec<f32> {
    let n = (sr as f32 * duration) as usize;
    (0..n)
        .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / sr as f32).sin())
        .collect()
}
