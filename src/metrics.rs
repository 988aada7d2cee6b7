use crate::Vector;
use crate::error::{RegressionError, Result};

fn check_lengths(y_true: &Vector, y_pred: &Vector) -> Result<()> {
    if y_true.is_empty() {
        return Err(RegressionError::EmptyInput("y_true is empty".to_string()));
    }
    if y_true.len() != y_pred.len() {
        return Err(RegressionError::DimensionMismatch {
            expected: y_true.len(),
            actual: y_pred.len(),
        });
    }
    Ok(())
}

pub fn mean_squared_error(y_true: &Vector, y_pred: &Vector) -> Result<f64> {
    check_lengths(y_true, y_pred)?;

    let diff = y_true - y_pred;
    Ok(diff.mapv(|x| x * x).sum() / y_true.len() as f64)
}

/// Coefficient of determination. Undefined (and an error) when `y_true` has no variance.
pub fn r2_score(y_true: &Vector, y_pred: &Vector) -> Result<f64> {
    check_lengths(y_true, y_pred)?;

    let y_mean = y_true.sum() / y_true.len() as f64;
    let ss_res = (y_true - y_pred).mapv(|x| x * x).sum();
    let ss_tot = y_true.mapv(|x| (x - y_mean) * (x - y_mean)).sum();

    if ss_tot == 0.0 {
        return Err(RegressionError::ZeroVariance);
    }

    Ok(1.0 - ss_res / ss_tot)
}

/// Share of probabilities that land on the right side of 0.5.
pub fn accuracy_score(y_true: &Vector, probabilities: &Vector) -> Result<f64> {
    check_lengths(y_true, probabilities)?;

    let correct = y_true
        .iter()
        .zip(probabilities.iter())
        .filter(|&(&actual, &p)| {
            let predicted = if p >= 0.5 { 1.0 } else { 0.0 };
            (predicted - actual).abs() < 1e-10
        })
        .count();

    Ok(correct as f64 / y_true.len() as f64)
}
