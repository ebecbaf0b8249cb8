//! Speaker-independent audio source separation with deep attractor networks.
//!
//! A mixture spectrogram is embedded one vector per time-frequency cell;
//! one attractor per source slot is derived from those embeddings, and the
//! affinity between every cell and every attractor becomes a soft mask over
//! the mixture. Training resolves the arbitrary order of the estimated
//! sources with a permutation-invariant loss.
//!
//! # Quick Start
//!
//! ```rust
//! use danet::{HParams, dataset::Batch, io, model::{Model, Strategy}, nn::RecurrentState, spectrum};
//!
//! let hp = HParams {
//!     fft_size: 32,
//!     fft_stride: 8,
//!     embed_size: 4,
//!     hidden_size: 8,
//!     ..Default::default()
//! };
//! let stft = hp.stft_config();
//! let a = spectrum::analyze(&io::tone(440.0, hp.sample_rate, 0.05), &stft).unwrap();
//! let b = spectrum::analyze(&io::tone(1800.0, hp.sample_rate, 0.05), &stft).unwrap();
//! let batch = Batch::from_tracks(&[&a, &b], hp.max_n_signal).unwrap();
//!
//! let model = Model::build("quickstart", &hp, candle_core::Device::Cpu).unwrap();
//! let scored = model.score(&batch, Strategy::Infer, &mut RecurrentState::new(), false).unwrap();
//! assert_eq!(scored.permutations.len(), 1);
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`spectrum`] | STFT analysis and overlap-add synthesis |
//! | [`separation`] | Attractor estimators, masks, PIT loss, reconstruction and SNR |
//! | [`nn`] | Parameter registry, embedding networks, optimizers |
//! | [`model`] | The assembled network: `build`, `score`, `separate` |
//! | [`train`] | Epoch loop with checkpointing and NaN rollback |
//! | [`dataset`] | Splits, padded batches, in-memory and WAV-directory datasets |
//! | [`checkpoint`] | Parameter persistence keyed by experiment and epoch |
//! | [`metrics`] | Per-batch loss/SNR and epoch aggregation |
//! | [`config`] | Hyper-parameters |
//! | [`io`] | WAV I/O and resampling |
//! | [`window`] | Window functions |
//! | [`files`] | Track discovery on disk |
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T>`]. Shape disagreements between
//! embeddings, attractors and ground truth are reported as
//! [`Error::ShapeMismatch`], never broadcast away.
//!
//! # Feature Flags
//!
//! | Flag | Description |
//! |------|-------------|
//! | `parallel` (default) | Rayon over STFT frames and per-example permutation search |

#![forbid(unsafe_code)]

pub mod error;
pub use error::{Error, Result};

pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod fft;
pub mod files;
pub mod io;
pub mod metrics;
pub mod model;
pub mod nn;
pub mod separation;
pub mod spectrum;
pub mod train;
pub mod utils;
pub mod window;

pub use config::{HParams, MAX_SOURCES};
