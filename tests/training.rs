//! Training loop behaviour: checkpoints, validation, NaN rollback.

use candle_core::Device;
use danet::checkpoint::{CheckpointStore, DirCheckpointStore, epoch_name};
use danet::dataset::{Dataset, InMemoryDataset, Split};
use danet::metrics::MemorySink;
use danet::model::Model;
use danet::nn::{EncoderKind, OptimizerKind};
use danet::separation::EstimatorKind;
use danet::train::{TrainOptions, Trainer};
use danet::{Error, HParams};
use ndarray::Array2;
use num_complex::Complex32;
use rand::Rng;
use std::cell::Cell;
use std::path::PathBuf;

fn hparams() -> HParams {
    HParams {
        fft_size: 16,
        fft_stride: 4,
        embed_size: 3,
        batch_size: 2,
        encoder: EncoderKind::Toy,
        train_estimator: EstimatorKind::Oracle,
        infer_estimator: EstimatorKind::Anchor,
        optimizer: OptimizerKind::Sgd,
        learning_rate: 1e-2,
        ..Default::default()
    }
}

fn random_tracks(n: usize, hp: &HParams) -> Vec<Array2<Complex32>> {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| {
            let frames = rng.gen_range(4..8);
            Array2::from_shape_fn((frames, hp.feature_size()), |_| {
                Complex32::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
            })
        })
        .collect()
}

fn nan_tracks(n: usize, hp: &HParams) -> Vec<Array2<Complex32>> {
    (0..n)
        .map(|_| Array2::from_elem((5, hp.feature_size()), Complex32::new(f32::NAN, 0.0)))
        .collect()
}

fn snapshot(model: &Model) -> Vec<Vec<f32>> {
    model
        .registry()
        .all_vars()
        .iter()
        .map(|v| v.as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap())
        .collect()
}

fn fresh_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("danet_training_{name}"));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// Serves clean training tracks except on the listed passes (0-based).
struct FlakyDataset {
    clean: Vec<Array2<Complex32>>,
    broken: Vec<Array2<Complex32>>,
    valid: Vec<Array2<Complex32>>,
    nan_passes: Vec<usize>,
    passes: Cell<usize>,
}

impl FlakyDataset {
    fn new(hp: &HParams, nan_passes: Vec<usize>) -> Self {
        Self {
            clean: random_tracks(8, hp),
            broken: nan_tracks(8, hp),
            valid: random_tracks(4, hp),
            nan_passes,
            passes: Cell::new(0),
        }
    }
}

impl Dataset for FlakyDataset {
    fn tracks(&self, split: Split) -> &[Array2<Complex32>] {
        match split {
            Split::Train => {
                let pass = self.passes.get();
                self.passes.set(pass + 1);
                if self.nan_passes.contains(&pass) {
                    &self.broken
                } else {
                    &self.clean
                }
            }
            _ => &self.valid,
        }
    }
}

#[test]
fn trains_saves_and_validates_every_epoch() {
    let hp = hparams();
    let dataset = InMemoryDataset::new()
        .with_split(Split::Train, random_tracks(8, &hp))
        .with_split(Split::Valid, random_tracks(4, &hp));
    let dir = fresh_dir("happy");
    let store = DirCheckpointStore::new(&dir);
    let sink = MemorySink::new();
    let mut model = Model::build("happy", &hp, Device::Cpu).unwrap();

    let before = snapshot(&model);
    let options = TrainOptions {
        num_epoch: 2,
        ..Default::default()
    };
    let reports = Trainer::new(&mut model, &store, &sink)
        .unwrap()
        .train(&dataset, &options)
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.steps() == 2 && !r.has_non_finite()));
    assert!(store.exists(&epoch_name("happy", 1)));
    assert!(store.exists(&epoch_name("happy", 2)));
    assert_eq!(sink.count(Split::Train), 4);
    assert_eq!(sink.count(Split::Valid), 2);

    let after = snapshot(&model);
    assert_ne!(before, after);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn learning_rate_decays_per_epoch() {
    let hp = HParams {
        lr_decay: 0.5,
        ..hparams()
    };
    let dataset = InMemoryDataset::new().with_split(Split::Train, random_tracks(4, &hp));
    let dir = fresh_dir("decay");
    let store = DirCheckpointStore::new(&dir);
    let sink = MemorySink::new();
    let mut model = Model::build("decay", &hp, Device::Cpu).unwrap();
    let mut trainer = Trainer::new(&mut model, &store, &sink).unwrap();
    let options = TrainOptions {
        num_epoch: 3,
        save_on_epoch: false,
        valid_on_epoch: false,
    };
    trainer.train(&dataset, &options).unwrap();
    assert!((trainer.learning_rate() - 1e-2 * 0.125).abs() < 1e-12);
}

#[test]
fn nan_in_first_epoch_aborts() {
    let hp = hparams();
    let dataset = FlakyDataset::new(&hp, vec![0]);
    let dir = fresh_dir("first");
    let store = DirCheckpointStore::new(&dir);
    let sink = MemorySink::new();
    let mut model = Model::build("first", &hp, Device::Cpu).unwrap();
    let err = Trainer::new(&mut model, &store, &sink)
        .unwrap()
        .train(&dataset, &TrainOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::NonFiniteMetrics { epoch: 1, .. }));
    assert!(!store.exists(&epoch_name("first", 1)));
}

#[test]
fn nan_in_later_epoch_restores_and_repeats_it() {
    let hp = hparams();
    let dataset = FlakyDataset::new(&hp, vec![1]);
    let dir = fresh_dir("rollback");
    let store = DirCheckpointStore::new(&dir);
    let sink = MemorySink::new();
    let mut model = Model::build("rollback", &hp, Device::Cpu).unwrap();
    let options = TrainOptions {
        num_epoch: 2,
        save_on_epoch: true,
        valid_on_epoch: false,
    };
    let reports = Trainer::new(&mut model, &store, &sink)
        .unwrap()
        .train(&dataset, &options)
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| !r.has_non_finite()));
    // epoch 1, the NaN pass, and the repeated epoch 2
    assert_eq!(dataset.passes.get(), 3);
    assert!(store.exists(&epoch_name("rollback", 2)));
    assert!(snapshot(&model).iter().flatten().all(|v| v.is_finite()));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn nan_without_epoch_checkpoints_aborts() {
    let hp = hparams();
    let dataset = FlakyDataset::new(&hp, vec![1]);
    let dir = fresh_dir("nosave");
    let store = DirCheckpointStore::new(&dir);
    let sink = MemorySink::new();
    let mut model = Model::build("nosave", &hp, Device::Cpu).unwrap();
    let options = TrainOptions {
        num_epoch: 3,
        save_on_epoch: false,
        valid_on_epoch: false,
    };
    let err = Trainer::new(&mut model, &store, &sink)
        .unwrap()
        .train(&dataset, &options)
        .unwrap_err();
    assert!(matches!(err, Error::NonFiniteMetrics { epoch: 2, .. }));
}

#[test]
fn persistent_nan_exhausts_retries() {
    let hp = HParams {
        max_nan_retries: 2,
        ..hparams()
    };
    let dataset = FlakyDataset::new(&hp, (1..10).collect());
    let dir = fresh_dir("retries");
    let store = DirCheckpointStore::new(&dir);
    let sink = MemorySink::new();
    let mut model = Model::build("retries", &hp, Device::Cpu).unwrap();
    let options = TrainOptions {
        num_epoch: 3,
        save_on_epoch: true,
        valid_on_epoch: false,
    };
    let err = Trainer::new(&mut model, &store, &sink)
        .unwrap()
        .train(&dataset, &options)
        .unwrap_err();
    assert!(matches!(err, Error::NonFiniteMetrics { epoch: 2, .. }));
    // one clean pass, then the original NaN pass and two retries
    assert_eq!(dataset.passes.get(), 4);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn too_few_tracks_is_a_dataset_error() {
    let hp = hparams();
    let dataset = InMemoryDataset::new().with_split(Split::Train, random_tracks(3, &hp));
    let store = DirCheckpointStore::new(fresh_dir("small"));
    let sink = MemorySink::new();
    let mut model = Model::build("small", &hp, Device::Cpu).unwrap();
    let err = Trainer::new(&mut model, &store, &sink)
        .unwrap()
        .train_epoch(&dataset)
        .unwrap_err();
    assert!(matches!(err, Error::Dataset(_)));
}

#[test]
fn test_sweep_uses_inference_estimator() {
    let hp = hparams();
    let dataset = InMemoryDataset::new().with_split(Split::Test, random_tracks(4, &hp));
    let store = DirCheckpointStore::new(fresh_dir("test_sweep"));
    let sink = MemorySink::new();
    let mut model = Model::build("test_sweep", &hp, Device::Cpu).unwrap();
    let report = Trainer::new(&mut model, &store, &sink)
        .unwrap()
        .evaluate(&dataset, Split::Test)
        .unwrap();
    assert_eq!(report.steps(), 1);
    assert!(report.mean().unwrap().is_finite());
    assert_eq!(sink.count(Split::Test), 1);
}
