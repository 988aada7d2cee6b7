//! Error types for model math, training and dataset handling.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RegressionError>;

/// Errors produced by the regression engine and its collaborators.
#[derive(Debug, Error)]
pub enum RegressionError {
    /// Feature count or polynomial degree is zero.
    #[error("invalid dimensions: feature count {feature_count}, max degree {max_degree}")]
    InvalidDimensions { feature_count: usize, max_degree: u32 },

    /// Weights do not match the term count, or X rows do not match y.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("empty input: {0}")]
    EmptyInput(String),

    /// R² is undefined when every target value is the same.
    #[error("zero variance in target values")]
    ZeroVariance,

    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    /// Cost became NaN or infinite; usually the learning rate is too large.
    #[error("gradient descent diverged at step {step}")]
    Diverged { step: usize },

    #[error("invalid hyperparameter {name}: {value}")]
    InvalidHyperparameter { name: &'static str, value: f64 },

    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// The continuous training loop is running.
    #[error("operation not allowed while training is active")]
    TrainingActive,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}
