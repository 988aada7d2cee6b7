use std::fmt;

use ndarray::ArrayView1;

use super::terms::{Term, polynomial_terms};
use crate::error::{RegressionError, Result};
use crate::{Matrix, Vector};

const LOG_EPSILON: f64 = 1e-15;

/// Hypothesis family. Both share the polynomial expansion and differ only in
/// the activation and the loss.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegressionType {
    Linear,
    Logistic,
}

impl RegressionType {
    fn activate(self, z: f64) -> f64 {
        match self {
            RegressionType::Linear => z,
            RegressionType::Logistic => sigmoid(z),
        }
    }

    fn loss(self, prediction: f64, target: f64) -> f64 {
        match self {
            RegressionType::Linear => (target - prediction).powi(2),
            RegressionType::Logistic => {
                let p = prediction.clamp(LOG_EPSILON, 1.0 - LOG_EPSILON);
                -(target * p.ln() + (1.0 - target) * (1.0 - p).ln())
            }
        }
    }

    /// Divisor applied on top of the sample mean: MSE is halved, cross-entropy is not.
    fn cost_scale(self) -> f64 {
        match self {
            RegressionType::Linear => 2.0,
            RegressionType::Logistic => 1.0,
        }
    }
}

impl fmt::Display for RegressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegressionType::Linear => write!(f, "linear"),
            RegressionType::Logistic => write!(f, "logistic"),
        }
    }
}

/// Sigmoid that never feeds a large positive argument to `exp`.
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let ez = z.exp();
        ez / (1.0 + ez)
    }
}

/// Single dispatch point for the hypothesis of either regression type.
fn evaluate(
    kind: RegressionType,
    terms: &[Term],
    weights: &Vector,
    x: ArrayView1<f64>,
    bias: f64,
) -> f64 {
    let z = terms
        .iter()
        .zip(weights.iter())
        .map(|(term, &w)| w * term.evaluate(x))
        .sum::<f64>()
        + bias;
    kind.activate(z)
}

fn check_weights(terms: &[Term], weights: &Vector) -> Result<()> {
    if weights.len() != terms.len() {
        return Err(RegressionError::DimensionMismatch {
            expected: terms.len(),
            actual: weights.len(),
        });
    }
    Ok(())
}

struct CatalogueEntry {
    key: &'static str,
    name: &'static str,
    kind: RegressionType,
    degree: u32,
}

const CATALOGUE: [CatalogueEntry; 5] = [
    CatalogueEntry {
        key: "simple-linear",
        name: "Simple Linear Regression",
        kind: RegressionType::Linear,
        degree: 1,
    },
    CatalogueEntry {
        key: "parabola-linear",
        name: "Parabolic Linear Regression",
        kind: RegressionType::Linear,
        degree: 2,
    },
    CatalogueEntry {
        key: "cubic-linear",
        name: "Cubic Linear Regression",
        kind: RegressionType::Linear,
        degree: 3,
    },
    CatalogueEntry {
        key: "complex-linear",
        name: "x^6 Linear Regression",
        kind: RegressionType::Linear,
        degree: 6,
    },
    CatalogueEntry {
        key: "logistic",
        name: "Logistic Regression",
        kind: RegressionType::Logistic,
        degree: 1,
    },
];

/// A polynomial regression model: a name, a hypothesis family and a maximum
/// monomial degree. The model holds no parameters; every operation is a pure
/// function of the weights, bias and data passed in.
#[derive(Clone, Debug, PartialEq)]
pub struct RegressionModel {
    pub name: String,
    pub kind: RegressionType,
    pub degree: u32,
}

impl RegressionModel {
    pub fn new(name: impl Into<String>, kind: RegressionType, degree: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            degree,
        }
    }

    fn from_entry(entry: &CatalogueEntry) -> Self {
        Self::new(entry.name, entry.kind, entry.degree)
    }

    pub fn simple_linear() -> Self {
        Self::from_entry(&CATALOGUE[0])
    }

    pub fn parabola_linear() -> Self {
        Self::from_entry(&CATALOGUE[1])
    }

    pub fn cubic_linear() -> Self {
        Self::from_entry(&CATALOGUE[2])
    }

    pub fn complex_linear() -> Self {
        Self::from_entry(&CATALOGUE[3])
    }

    pub fn logistic() -> Self {
        Self::from_entry(&CATALOGUE[4])
    }

    pub fn catalogue() -> Vec<Self> {
        CATALOGUE.iter().map(Self::from_entry).collect()
    }

    /// Looks up a predefined model by its short key or display name, ignoring case.
    pub fn by_name(name: &str) -> Result<Self> {
        CATALOGUE
            .iter()
            .find(|entry| {
                entry.key.eq_ignore_ascii_case(name) || entry.name.eq_ignore_ascii_case(name)
            })
            .map(Self::from_entry)
            .ok_or_else(|| RegressionError::UnknownModel(name.to_string()))
    }

    pub fn terms(&self, feature_count: usize) -> Result<Vec<Term>> {
        polynomial_terms(feature_count, self.degree)
    }

    pub fn weights_count(&self, feature_count: usize) -> Result<usize> {
        Ok(self.terms(feature_count)?.len())
    }

    pub fn default_weights(&self, feature_count: usize) -> Result<Vector> {
        Ok(Vector::zeros(self.weights_count(feature_count)?))
    }

    pub fn hypothesis(&self, weights: &Vector, x: ArrayView1<f64>, bias: f64) -> Result<f64> {
        let terms = self.terms(x.len())?;
        check_weights(&terms, weights)?;
        Ok(evaluate(self.kind, &terms, weights, x, bias))
    }

    pub fn predict(&self, x: &Matrix, weights: &Vector, bias: f64) -> Result<Vector> {
        let terms = self.terms(x.ncols())?;
        check_weights(&terms, weights)?;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| evaluate(self.kind, &terms, weights, row, bias))
            .collect())
    }

    fn prepare(&self, x: &Matrix, y: &Vector, weights: &Vector) -> Result<Vec<Term>> {
        if x.nrows() == 0 {
            return Err(RegressionError::InvalidDataset("dataset has no samples".to_string()));
        }
        if x.nrows() != y.len() {
            return Err(RegressionError::DimensionMismatch {
                expected: x.nrows(),
                actual: y.len(),
            });
        }
        let terms = self.terms(x.ncols())?;
        check_weights(&terms, weights)?;
        Ok(terms)
    }

    /// Unregularized cost averaged over all samples.
    pub fn cost(&self, x: &Matrix, y: &Vector, weights: &Vector, bias: f64) -> Result<f64> {
        let terms = self.prepare(x, y, weights)?;
        let m = x.nrows() as f64;

        let total = x
            .rows()
            .into_iter()
            .zip(y.iter())
            .map(|(row, &target)| {
                let prediction = evaluate(self.kind, &terms, weights, row, bias);
                self.kind.loss(prediction, target)
            })
            .sum::<f64>();

        Ok(total / m / self.kind.cost_scale())
    }

    /// Unregularized gradient of the cost with respect to the weights and the bias.
    pub fn gradient(
        &self,
        x: &Matrix,
        y: &Vector,
        weights: &Vector,
        bias: f64,
    ) -> Result<(Vector, f64)> {
        let terms = self.prepare(x, y, weights)?;
        let m = x.nrows() as f64;

        let mut weights_gradient = Vector::zeros(terms.len());
        let mut bias_gradient = 0.0;
        let mut term_values = Vector::zeros(terms.len());

        for (row, &target) in x.rows().into_iter().zip(y.iter()) {
            for (value, term) in term_values.iter_mut().zip(terms.iter()) {
                *value = term.evaluate(row);
            }
            let z = term_values.dot(weights) + bias;
            let error = self.kind.activate(z) - target;

            weights_gradient.scaled_add(error, &term_values);
            bias_gradient += error;
        }

        Ok((weights_gradient / m, bias_gradient / m))
    }

    /// Human readable formula, e.g. `w1 * x1 + w2 * x1^2 + b`.
    pub fn description(&self, feature_count: usize) -> Result<String> {
        let terms = self.terms(feature_count)?;

        let formula = terms
            .iter()
            .enumerate()
            .map(|(index, term)| {
                let factors = term
                    .exponents()
                    .iter()
                    .enumerate()
                    .filter(|(_, exponent)| **exponent > 0)
                    .map(|(j, &exponent)| match exponent {
                        1 => format!("x{}", j + 1),
                        _ => format!("x{}^{}", j + 1, exponent),
                    })
                    .collect::<Vec<_>>()
                    .join(" * ");
                format!("w{} * {}", index + 1, factors)
            })
            .collect::<Vec<_>>()
            .join(" + ");

        Ok(format!("{} + b", formula))
    }

    pub fn r2(&self, x: &Matrix, weights: &Vector, bias: f64, y: &Vector) -> Result<f64> {
        if y.is_empty() || weights.is_empty() || x.nrows() == 0 {
            return Err(RegressionError::EmptyInput(
                "x, y and weights must be non-empty".to_string(),
            ));
        }

        let predictions = self.predict(x, weights, bias)?;
        if y.len() != predictions.len() {
            return Err(RegressionError::DimensionMismatch {
                expected: predictions.len(),
                actual: y.len(),
            });
        }

        crate::metrics::r2_score(y, &predictions)
    }
}

impl Default for RegressionModel {
    fn default() -> Self {
        Self::simple_linear()
    }
}

impl fmt::Display for RegressionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, degree {})", self.name, self.kind, self.degree)
    }
}
