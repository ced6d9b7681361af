use hystar::prelude::StarError;
use strum::EnumIs;
use thiserror::Error;

#[derive(Debug, EnumIs, Error)]
pub enum ReachError {
    #[error(transparent)]
    Star(#[from] StarError),

    /// Rejection sampling missed too many times in a row.
    #[error(
        "Sampling exhausted after {misses} consecutive misses ({accepted}/{requested} points accepted). The predicate is likely ill-conditioned or nearly degenerate."
    )]
    SamplingExhausted {
        accepted: usize,
        requested: usize,
        misses: usize,
    },

    #[error("Simulation in mode `{mode}` failed: {reason}")]
    Simulation { mode: String, reason: String },

    /// Trajectories of one batch do not have the same number of samples.
    #[error("Trajectory length mismatch: expected {expected} samples, found {found}")]
    TrajectoryMismatch { expected: usize, found: usize },

    /// Trajectories of one batch disagree on a time stamp.
    #[error("Trajectory time stamps disagree at index {index}: expected {expected}, found {found}")]
    MisalignedTimes {
        index: usize,
        expected: f64,
        found: f64,
    },

    #[error("Reach tube times must be strictly increasing, got {next} after {previous}")]
    NonMonotonicTube { previous: f64, next: f64 },

    /// The selected strategy needs a component that was not provided.
    #[error("Missing component: {0}")]
    MissingComponent(&'static str),

    #[error("Reach tube construction was cancelled")]
    Cancelled,

    /// A worker thread panicked during parallel fitting.
    #[error("Worker thread failed: {0}")]
    Worker(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration file '{file}': {source}")]
    ConfigParse {
        source: toml::de::Error,
        file: String,
    },

    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(String),
}

pub type ReachResult<T> = Result<T, ReachError>;
