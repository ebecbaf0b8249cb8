//! The separation core: attractor estimation, mask separation,
//! permutation-invariant scoring and signal reconstruction.
//!
//! Tensor layouts, with `B` examples, `N` source slots, `T` frames, `F`
//! frequency bins and `E` embedding dimensions:
//!
//! | Value | Shape |
//! |-------|-------|
//! | source / separated log-magnitude | `[B, N, T, F]` |
//! | mixture log-magnitude | `[B, T, F]` |
//! | embeddings | `[B, T, F, E]` |
//! | attractors | `[B, N, E]` |

pub mod attractor;
pub mod mask;
pub mod pit;
pub mod reconstruct;

pub use attractor::{AnchorEstimator, AttractorEstimator, EstimatorKind, OracleEstimator};
pub use mask::{Separation, separate};
pub use pit::{Permutation, PitScore, permutations, pit_mse_loss};
pub use reconstruct::{SNR_EPS, batch_snr, reconstruct};
