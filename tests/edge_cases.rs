//! Contract violations fail loudly.
//!
//! Tests cover:
//! - Unknown variant names
//! - Missing inputs
//! - Shape disagreements between embeddings, attractors and ground truth

use candle_core::{DType, Device, Tensor};
use danet::dataset::{Batch, Split};
use danet::model::{Model, Strategy};
use danet::nn::{EncoderKind, OptimizerKind, RecurrentState};
use danet::separation::{EstimatorKind, OracleEstimator, pit_mse_loss, separate};
use danet::spectrum::{self, StftConfig};
use danet::window::WindowType;
use danet::{Error, HParams, io};
use ndarray::Array2;
use num_complex::Complex32;

fn zeros(shape: &[usize]) -> Tensor {
    Tensor::zeros(shape, DType::F32, &Device::Cpu).unwrap()
}

// Names

#[test]
fn unknown_names_are_rejected() {
    for err in [
        "kmeans".parse::<EstimatorKind>().unwrap_err(),
        "gru".parse::<EncoderKind>().unwrap_err(),
        "rmsprop".parse::<OptimizerKind>().unwrap_err(),
        "kaiser".parse::<WindowType>().unwrap_err(),
        "dev".parse::<Split>().unwrap_err(),
    ] {
        assert!(matches!(err, Error::UnknownVariant { .. }), "{err}");
    }
}

#[test]
fn hparams_file_with_unknown_estimator_fails() {
    let path = std::env::temp_dir().join("danet_bad_hparams.json");
    std::fs::write(&path, r#"{"train_estimator": "spectral"}"#).unwrap();
    assert!(matches!(HParams::from_json_file(&path), Err(Error::Json(_))));
    std::fs::write(&path, r#"{"max_n_signal": 0}"#).unwrap();
    assert!(matches!(
        HParams::from_json_file(&path),
        Err(Error::InvalidSize { name: "max_n_signal", .. })
    ));
    let _ = std::fs::remove_file(&path);
}

// Inputs

#[test]
fn missing_input_file() {
    let err = io::load_wavfile(None, &HParams::default()).unwrap_err();
    assert!(matches!(err, Error::MissingInput { flag: "--input-file", .. }));
}

#[test]
fn empty_and_non_finite_audio() {
    let cfg = StftConfig::default();
    assert!(matches!(spectrum::analyze(&[], &cfg), Err(Error::EmptyAudio)));
    assert!(matches!(
        spectrum::analyze(&[0.0, f32::INFINITY], &cfg),
        Err(Error::NonFiniteAudio)
    ));
}

#[test]
fn oracle_needs_ground_truth_at_inference() {
    let hp = HParams {
        fft_size: 16,
        fft_stride: 4,
        embed_size: 3,
        encoder: EncoderKind::Toy,
        train_estimator: EstimatorKind::Oracle,
        infer_estimator: EstimatorKind::Oracle,
        ..Default::default()
    };
    let model = Model::build("oracle", &hp, Device::Cpu).unwrap();
    let mixture = Array2::<Complex32>::zeros((4, hp.feature_size()));
    assert!(matches!(
        model.separate(&mixture, &mut RecurrentState::new()),
        Err(Error::OracleNeedsTruth)
    ));
}

// Shapes

#[test]
fn attractor_count_disagreeing_with_truth() {
    let embeddings = zeros(&[1, 3, 4, 5]);
    let truth = zeros(&[1, 3, 3, 4]);
    assert!(matches!(
        OracleEstimator::new(2).estimate(&embeddings, &truth),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn truth_with_wrong_time_axis() {
    let embeddings = zeros(&[1, 3, 4, 5]);
    let truth = zeros(&[1, 2, 5, 4]);
    assert!(OracleEstimator::new(2).estimate(&embeddings, &truth).is_err());
}

#[test]
fn attractors_with_wrong_batch_or_width() {
    let embeddings = zeros(&[2, 3, 4, 5]);
    let mixture = zeros(&[2, 3, 4]);
    assert!(separate(&embeddings, &zeros(&[1, 2, 5]), &mixture).is_err());
    assert!(separate(&embeddings, &zeros(&[2, 2, 6]), &mixture).is_err());
    assert!(separate(&embeddings, &zeros(&[2, 2, 5]), &zeros(&[2, 4, 3])).is_err());
}

#[test]
fn pit_with_disagreeing_source_counts() {
    assert!(matches!(
        pit_mse_loss(&zeros(&[1, 2, 3, 4]), &zeros(&[1, 3, 3, 4])),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn batch_with_wrong_source_count_for_model() {
    let hp = HParams {
        fft_size: 16,
        fft_stride: 4,
        embed_size: 3,
        encoder: EncoderKind::Toy,
        ..Default::default()
    };
    let model = Model::build("count", &hp, Device::Cpu).unwrap();
    let track = Array2::<Complex32>::zeros((3, hp.feature_size()));
    let batch = Batch::from_tracks(&[&track], 1).unwrap();
    let err = model
        .score(&batch, Strategy::Train, &mut RecurrentState::new(), false)
        .unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
}

#[test]
fn spectrogram_with_wrong_bin_count() {
    let hp = HParams::default();
    let spec = Array2::<Complex32>::zeros((4, 10));
    let path = std::env::temp_dir().join("danet_never_written.wav");
    assert!(io::save_wavfile(&path, spec.view(), &hp).is_err());
    assert!(!path.exists());
}
