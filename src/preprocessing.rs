use ndarray::Axis;

use crate::error::{RegressionError, Result};
use crate::{Matrix, Vector};

/// Mean and population standard deviation captured by a z-score normalization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleParams {
    pub mean: f64,
    pub std_dev: f64,
}

impl ScaleParams {
    pub fn identity() -> Self {
        Self { mean: 0.0, std_dev: 1.0 }
    }

    pub fn normalize(&self, value: f64) -> f64 {
        if self.std_dev > 0.0 {
            (value - self.mean) / self.std_dev
        } else {
            value - self.mean
        }
    }

    pub fn denormalize(&self, value: f64) -> f64 {
        if self.std_dev > 0.0 {
            value * self.std_dev + self.mean
        } else {
            value + self.mean
        }
    }
}

pub struct DataScaler;

impl DataScaler {
    /// Z-score normalization of a single series. A constant series is only centred.
    pub fn normalize(values: &Vector) -> Result<(Vector, ScaleParams)> {
        if values.is_empty() {
            return Err(RegressionError::EmptyInput("cannot normalize an empty series".to_string()));
        }

        let n = values.len() as f64;
        let mean = values.sum() / n;
        let variance = values.mapv(|v| (v - mean) * (v - mean)).sum() / n;
        let params = ScaleParams {
            mean,
            std_dev: variance.sqrt(),
        };

        Ok((values.mapv(|v| params.normalize(v)), params))
    }
}

/// Column-wise z-score scaler.
pub struct StandardScaler {
    params: Option<Vec<ScaleParams>>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self { params: None }
    }

    pub fn fit(&mut self, data: &Matrix) -> Result<()> {
        let params = data
            .axis_iter(Axis(1))
            .map(|column| DataScaler::normalize(&column.to_owned()).map(|(_, p)| p))
            .collect::<Result<Vec<_>>>()?;

        self.params = Some(params);
        Ok(())
    }

    pub fn transform(&self, data: &Matrix) -> Result<Matrix> {
        let params = self.params()?;
        if data.ncols() != params.len() {
            return Err(RegressionError::DimensionMismatch {
                expected: params.len(),
                actual: data.ncols(),
            });
        }

        let mut result = data.clone();
        for (mut column, p) in result.axis_iter_mut(Axis(1)).zip(params.iter()) {
            column.mapv_inplace(|v| p.normalize(v));
        }

        Ok(result)
    }

    pub fn fit_transform(&mut self, data: &Matrix) -> Result<Matrix> {
        self.fit(data)?;
        self.transform(data)
    }

    pub fn params(&self) -> Result<&[ScaleParams]> {
        self.params.as_deref().ok_or_else(|| {
            RegressionError::InvalidDataset("scaler not fitted, call fit() first".to_string())
        })
    }
}

impl Default for StandardScaler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_normalize_series() {
        let values = array![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let (normalized, params) = DataScaler::normalize(&values).unwrap();

        assert_abs_diff_eq!(params.mean, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(params.std_dev, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(normalized[0], -1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(normalized.sum(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_denormalize_inverts() {
        let values = array![10.0, 20.0, 35.0];
        let (normalized, params) = DataScaler::normalize(&values).unwrap();
        for (n, v) in normalized.iter().zip(values.iter()) {
            assert_abs_diff_eq!(params.denormalize(*n), *v, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_constant_series_is_centred() {
        let (normalized, params) = DataScaler::normalize(&array![3.0, 3.0, 3.0]).unwrap();
        assert_eq!(params.std_dev, 0.0);
        assert!(normalized.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_empty_series() {
        assert!(DataScaler::normalize(&Vector::zeros(0)).is_err());
    }

    #[test]
    fn test_standard_scaler() {
        let data = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let mut scaler = StandardScaler::new();

        let scaled = scaler.fit_transform(&data).unwrap();
        assert_eq!(scaled.shape(), data.shape());
        for column in scaled.axis_iter(Axis(1)) {
            assert_abs_diff_eq!(column.sum(), 0.0, epsilon = 1e-12);
        }
        assert_eq!(scaler.params().unwrap().len(), 2);
    }

    #[test]
    fn test_transform_without_fit() {
        let scaler = StandardScaler::new();
        assert!(scaler.transform(&array![[1.0]]).is_err());
    }
}
