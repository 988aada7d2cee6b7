//! Polynomial linear and logistic regression fitted by batch gradient descent,
//! with a cancellable background training loop that streams throttled progress.

pub use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

pub mod config;
pub mod dataset;
pub mod error;
pub mod linear_model;
pub mod loader;
pub mod metrics;
pub mod preprocessing;
pub mod trainer;

pub type Vector = Array1<f64>;
pub type Matrix = Array2<f64>;

pub use config::TrainerConfig;
pub use dataset::{Dataset, PreparedDataset};
pub use error::{RegressionError, Result};
pub use linear_model::{RegressionModel, RegressionType, Term, polynomial_terms};
pub use loader::{LoadedTable, load_csv, parse_csv};
pub use preprocessing::{DataScaler, ScaleParams, StandardScaler};
pub use trainer::{Hyperparameters, Snapshot, SnapshotStream, StopReason, Trainer, TrainingState};
