use crate::error::{RegressionError, Result};
use crate::linear_model::RegressionModel;
use crate::trainer::snapshot::{Snapshot, StopReason};
use crate::{Matrix, Vector};

/// Gradient descent settings. Read once at the start of every step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hyperparameters {
    pub learning_rate: f64,
    /// L2 strength. Applied to the weights only, never to the bias.
    pub lambda: f64,
    /// Percentage cost improvement at or below which the loop stops.
    pub precision_threshold: f64,
    pub max_steps: Option<usize>,
}

/// Parameters and cost bookkeeping for one model/dataset pairing.
///
/// A session is replaced wholesale whenever the model or the dataset changes,
/// so the weight vector always starts out sized for the active model.
#[derive(Clone, Debug)]
pub(crate) struct Session {
    pub(crate) model: RegressionModel,
    pub(crate) features: Matrix,
    pub(crate) labels: Vector,
    pub(crate) weights: Vector,
    pub(crate) bias: f64,
    pub(crate) step: usize,
    pub(crate) current_cost: f64,
    /// `None` until a step has been taken since the last reset.
    pub(crate) previous_cost: Option<f64>,
}

impl Session {
    pub(crate) fn new(
        model: RegressionModel,
        features: Matrix,
        labels: Vector,
        weights: Vector,
        bias: f64,
        lambda: f64,
    ) -> Result<Self> {
        if features.nrows() == 0 {
            return Err(RegressionError::InvalidDataset("dataset has no samples".to_string()));
        }
        if features.nrows() != labels.len() {
            return Err(RegressionError::DimensionMismatch {
                expected: features.nrows(),
                actual: labels.len(),
            });
        }

        let mut session = Self {
            model,
            features,
            labels,
            weights,
            bias,
            step: 0,
            current_cost: 0.0,
            previous_cost: None,
        };
        session.current_cost = session.regularized_cost(&session.weights, session.bias, lambda)?;
        Ok(session)
    }

    /// Fresh zeroed session for `model` over `features`/`labels`.
    pub(crate) fn zeroed(
        model: RegressionModel,
        features: Matrix,
        labels: Vector,
        lambda: f64,
    ) -> Result<Self> {
        let weights = model.default_weights(features.ncols())?;
        Self::new(model, features, labels, weights, 0.0, lambda)
    }

    fn n_samples(&self) -> f64 {
        self.features.nrows() as f64
    }

    pub(crate) fn regularized_cost(&self, weights: &Vector, bias: f64, lambda: f64) -> Result<f64> {
        let cost = self.model.cost(&self.features, &self.labels, weights, bias)?;
        let penalty = lambda * weights.dot(weights) / (2.0 * self.n_samples());
        Ok(cost + penalty)
    }

    /// One gradient descent iteration. On error nothing is modified.
    pub(crate) fn step(&mut self, hyper: &Hyperparameters) -> Result<()> {
        let m = self.n_samples();
        let (weights_gradient, bias_gradient) =
            self.model.gradient(&self.features, &self.labels, &self.weights, self.bias)?;

        let decay = &self.weights * (hyper.lambda / m);
        let weights = &self.weights - &((weights_gradient + decay) * hyper.learning_rate);
        let bias = self.bias - hyper.learning_rate * bias_gradient;

        let cost = self.regularized_cost(&weights, bias, hyper.lambda)?;
        if !cost.is_finite() {
            return Err(RegressionError::Diverged { step: self.step + 1 });
        }

        self.weights = weights;
        self.bias = bias;
        self.previous_cost = Some(self.current_cost);
        self.current_cost = cost;
        self.step += 1;
        Ok(())
    }

    /// Zero parameters and step, recompute the cost, forget the previous cost.
    pub(crate) fn reset(&mut self, lambda: f64) -> Result<()> {
        let weights = self.model.default_weights(self.features.ncols())?;
        let cost = self.regularized_cost(&weights, 0.0, lambda)?;

        self.weights = weights;
        self.bias = 0.0;
        self.step = 0;
        self.current_cost = cost;
        self.previous_cost = None;
        Ok(())
    }

    /// Percentage drop in cost over the last step, if a step has been taken.
    pub(crate) fn cost_delta_percent(&self) -> Option<f64> {
        let previous = self.previous_cost?;
        if previous == 0.0 {
            // Already at zero: staying there is no improvement, rising is negative.
            return Some(if self.current_cost == 0.0 { 0.0 } else { f64::NEG_INFINITY });
        }
        Some((previous - self.current_cost) / previous * 100.0)
    }

    pub(crate) fn has_converged(&self, precision_threshold: f64) -> bool {
        self.cost_delta_percent()
            .is_some_and(|delta| delta <= precision_threshold)
    }

    pub(crate) fn snapshot(&self, finished: Option<StopReason>) -> Snapshot {
        Snapshot {
            weights: self.weights.clone(),
            bias: self.bias,
            step: self.step,
            cost: self.current_cost,
            finished,
        }
    }
}
