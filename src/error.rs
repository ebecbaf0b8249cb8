/// Crate-level error type for the danet separation library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid parameter value.
    #[error("invalid parameter `{name}`: got {value}, {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// A required dimension is zero or invalid.
    #[error("invalid size for `{name}`: {value} ({reason})")]
    InvalidSize {
        name: &'static str,
        value: usize,
        reason: &'static str,
    },

    /// Audio data is empty when a non-empty signal was required.
    #[error("audio data is empty")]
    EmptyAudio,

    /// Audio data contains non-finite values (NaN or Inf).
    #[error("audio data contains non-finite values")]
    NonFiniteAudio,

    /// Input array or tensor has incorrect shape for the operation.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    /// A mode, strategy or other named variant was not recognised.
    #[error("unknown {kind} \"{name}\" (expected one of: {expected})")]
    UnknownVariant {
        kind: &'static str,
        name: String,
        expected: &'static str,
    },

    /// A required input file was not specified.
    #[error("{what} not specified, please specify via {flag}")]
    MissingInput {
        what: &'static str,
        flag: &'static str,
    },

    /// The oracle attractor estimator was asked to run without ground truth.
    #[error("oracle attractor estimation requires ground-truth sources")]
    OracleNeedsTruth,

    /// Loss or SNR became NaN and no checkpoint could be restored.
    #[error("non-finite metrics in epoch {epoch}: {reason}")]
    NonFiniteMetrics { epoch: usize, reason: String },

    /// Checkpoint store failure.
    #[error("checkpoint `{name}`: {reason}")]
    Checkpoint { name: String, reason: String },

    /// Dataset failure (missing split, too few tracks, ...).
    #[error("dataset: {0}")]
    Dataset(String),

    /// FFT planner or transform failure.
    #[error("fft error: {0}")]
    Fft(String),

    /// Audio I/O errors.
    #[error(transparent)]
    Audio(#[from] crate::io::AudioError),

    /// Tensor engine errors.
    #[error(transparent)]
    Tensor(#[from] candle_core::Error),

    /// Hyper-parameter file parse errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// File I/O errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn shape(expected: impl Into<String>, got: impl std::fmt::Debug) -> Self {
        Error::ShapeMismatch {
            expected: expected.into(),
            got: format!("{got:?}"),
        }
    }
}

/// Convenience Result type for danet operations.
pub type Result<T> = std::result::Result<T, Error>;
