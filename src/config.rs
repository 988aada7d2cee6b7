use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RegressionError, Result};
use crate::linear_model::RegressionModel;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_lambda")]
    pub lambda: f64,
    /// Percentage improvement in cost below which training counts as converged.
    #[serde(default = "default_precision_threshold")]
    pub precision_threshold: f64,
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_normalize_x")]
    pub normalize_x: bool,
    #[serde(default)]
    pub normalize_y: bool,
    #[serde(default)]
    pub max_steps: Option<usize>,
}

fn default_learning_rate() -> f64 {
    0.0001
}
fn default_lambda() -> f64 {
    0.01
}
fn default_precision_threshold() -> f64 {
    0.001
}
fn default_snapshot_interval_ms() -> u64 {
    50
}
fn default_model() -> String {
    RegressionModel::simple_linear().name
}
fn default_normalize_x() -> bool {
    true
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            lambda: default_lambda(),
            precision_threshold: default_precision_threshold(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            model: default_model(),
            normalize_x: default_normalize_x(),
            normalize_y: false,
            max_steps: None,
        }
    }
}

impl TrainerConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        validate_learning_rate(self.learning_rate)?;
        validate_lambda(self.lambda)?;
        validate_precision_threshold(self.precision_threshold)?;
        RegressionModel::by_name(&self.model)?;
        Ok(())
    }

    pub fn resolve_model(&self) -> Result<RegressionModel> {
        RegressionModel::by_name(&self.model)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }
}

pub(crate) fn validate_learning_rate(value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(RegressionError::InvalidHyperparameter {
            name: "learning_rate",
            value,
        })
    }
}

pub(crate) fn validate_lambda(value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(RegressionError::InvalidHyperparameter { name: "lambda", value })
    }
}

pub(crate) fn validate_precision_threshold(value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(RegressionError::InvalidHyperparameter {
            name: "precision_threshold",
            value,
        })
    }
}
