//! Learnable building blocks: parameter registry, embedding networks and
//! optimizers.

pub mod encoder;
pub mod optim;
pub mod params;

pub use encoder::{EmbeddingNetwork, EncoderKind, LstmEncoder, RecurrentState, ToyEncoder};
pub use optim::{Optimizer, OptimizerKind};
pub use params::ParamRegistry;
