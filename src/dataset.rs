use ndarray::{Axis, Zip};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::{Normal, Uniform};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::{RegressionError, Result};
use crate::preprocessing::{DataScaler, ScaleParams, StandardScaler};
use crate::{Matrix, Vector};

/// Fish length (cm) against weight (g), the default one-feature dataset.
const FISH_LENGTH: [f64; 159] = [
    19.0, 7.5, 9.3, 10.1, 10.0, 10.8, 10.4, 10.7, 11.4, 11.3,
    11.3, 11.5, 12.1, 11.7, 13.2, 13.8, 12.5, 12.9, 13.8, 15.0,
    13.5, 14.3, 16.5, 15.7, 17.5, 16.8, 17.2, 17.8, 18.2, 18.2,
    16.3, 16.2, 19.1, 19.0, 20.0, 19.0, 18.6, 19.4, 17.5, 20.0,
    20.0, 19.0, 19.3, 20.0, 20.5, 20.0, 21.0, 19.0, 20.5, 19.8,
    20.7, 22.0, 20.4, 18.4, 20.5, 21.0, 20.5, 21.1, 22.0, 22.0,
    19.0, 21.5, 23.6, 23.0, 22.6, 23.5, 22.1, 21.2, 30.0, 25.0,
    22.0, 23.2, 25.4, 25.9, 25.4, 25.4, 23.6, 24.1, 25.0, 23.0,
    24.0, 24.0, 24.0, 25.2, 26.9, 31.7, 32.7, 34.8, 25.6, 27.8,
    23.9, 29.5, 36.0, 26.3, 27.6, 29.5, 26.5, 35.5, 26.8, 27.6,
    40.0, 28.4, 26.8, 28.5, 28.7, 29.1, 42.0, 40.0, 30.5, 28.5,
    40.1, 32.0, 43.2, 31.3, 29.4, 29.4, 30.9, 31.5, 31.0, 36.5,
    31.8, 31.4, 34.0, 34.6, 30.4, 30.4, 31.9, 34.0, 34.5, 32.7,
    32.0, 31.8, 44.8, 33.7, 36.6, 37.1, 32.5, 32.8, 36.9, 36.5,
    37.0, 35.0, 36.2, 38.0, 48.3, 35.0, 37.4, 33.5, 37.3, 39.8,
    40.2, 41.1, 37.0, 39.0, 40.1, 52.0, 56.0, 56.0, 59.0,
];

const FISH_WEIGHT: [f64; 159] = [
    8.0, 5.9, 6.7, 7.0, 7.5, 8.7, 9.7, 9.8, 9.8, 9.9,
    10.0, 12.2, 12.2, 13.4, 19.7, 19.9, 32.0, 40.0, 40.0, 51.5,
    55.0, 60.0, 69.0, 70.0, 78.0, 78.0, 80.0, 85.0, 85.0, 87.0,
    90.0, 100.0, 110.0, 110.0, 110.0, 115.0, 120.0, 120.0, 120.0, 120.0,
    120.0, 125.0, 130.0, 130.0, 130.0, 135.0, 140.0, 140.0, 145.0, 145.0,
    145.0, 145.0, 150.0, 150.0, 150.0, 150.0, 160.0, 160.0, 161.0, 169.0,
    170.0, 170.0, 180.0, 180.0, 188.0, 197.0, 200.0, 200.0, 200.0, 218.0,
    225.0, 242.0, 250.0, 250.0, 260.0, 265.0, 270.0, 270.0, 272.0, 273.0,
    290.0, 290.0, 300.0, 300.0, 300.0, 300.0, 300.0, 300.0, 300.0, 306.0,
    320.0, 340.0, 340.0, 345.0, 363.0, 390.0, 390.0, 430.0, 430.0, 450.0,
    450.0, 456.0, 475.0, 500.0, 500.0, 500.0, 500.0, 500.0, 510.0, 514.0,
    540.0, 540.0, 556.0, 567.0, 575.0, 600.0, 600.0, 610.0, 620.0, 650.0,
    650.0, 680.0, 685.0, 685.0, 690.0, 700.0, 700.0, 700.0, 700.0, 700.0,
    714.0, 720.0, 725.0, 770.0, 800.0, 820.0, 820.0, 840.0, 850.0, 850.0,
    900.0, 900.0, 920.0, 925.0, 950.0, 950.0, 955.0, 975.0, 1000.0, 1000.0,
    1000.0, 1000.0, 1000.0, 1015.0, 1100.0, 1100.0, 1250.0, 1550.0, 1600.0,
];

#[derive(Clone, Debug)]
pub struct Dataset {
    pub name: String,
    pub features: Matrix,
    pub labels: Vector,
}

/// Training input handed to the `Trainer`: features and labels, possibly
/// normalized, with the parameters needed to map values back.
#[derive(Clone, Debug)]
pub struct PreparedDataset {
    pub features: Matrix,
    pub labels: Vector,
    pub feature_scales: Vec<ScaleParams>,
    pub label_scale: ScaleParams,
}

impl PreparedDataset {
    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }
}

impl Dataset {
    pub fn new(name: impl Into<String>, features: Matrix, labels: Vector) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(RegressionError::DimensionMismatch {
                expected: features.nrows(),
                actual: labels.len(),
            });
        }
        if features.nrows() == 0 || features.ncols() == 0 {
            return Err(RegressionError::InvalidDataset(
                "dataset needs at least one sample and one feature".to_string(),
            ));
        }

        Ok(Self {
            name: name.into(),
            features,
            labels,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn fish() -> Self {
        Self {
            name: "Default Fish Dataset".to_string(),
            features: Vector::from(FISH_LENGTH.to_vec()).insert_axis(Axis(1)),
            labels: Vector::from(FISH_WEIGHT.to_vec()),
        }
    }

    /// Builds a dataset from selected columns of a loaded table.
    pub fn select_columns(
        name: impl Into<String>,
        table: &Matrix,
        x_indexes: &[usize],
        y_index: usize,
    ) -> Result<Self> {
        let out_of_range = x_indexes
            .iter()
            .chain(std::iter::once(&y_index))
            .find(|&&i| i >= table.ncols());
        if let Some(&index) = out_of_range {
            return Err(RegressionError::InvalidDataset(format!(
                "column {} out of range for a table with {} columns",
                index,
                table.ncols()
            )));
        }

        let features = table.select(Axis(1), x_indexes);
        let labels = table.column(y_index).to_owned();
        Self::new(name, features, labels)
    }

    /// Normalizes features column-wise and/or labels, keeping the scale parameters.
    pub fn prepared(&self, normalize_x: bool, normalize_y: bool) -> Result<PreparedDataset> {
        let (features, feature_scales) = if normalize_x {
            let mut scaler = StandardScaler::new();
            let features = scaler.fit_transform(&self.features)?;
            (features, scaler.params()?.to_vec())
        } else {
            (self.features.clone(), vec![ScaleParams::identity(); self.n_features()])
        };

        let (labels, label_scale) = if normalize_y {
            DataScaler::normalize(&self.labels)?
        } else {
            (self.labels.clone(), ScaleParams::identity())
        };

        Ok(PreparedDataset {
            features,
            labels,
            feature_scales,
            label_scale,
        })
    }

    /// Random features in `[-1, 1]` with `y = X·w + b` plus gaussian noise.
    pub fn synthetic_linear(
        n_samples: usize,
        weights: &Vector,
        bias: f64,
        noise: f64,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let features = Matrix::random_using(
            (n_samples, weights.len()),
            Uniform::new_inclusive(-1.0, 1.0),
            &mut rng,
        );

        let noise_distribution =
            Normal::new(0.0, noise).map_err(|_| RegressionError::InvalidHyperparameter {
                name: "noise",
                value: noise,
            })?;
        let noise = Vector::random_using(n_samples, noise_distribution, &mut rng);

        let labels = features.dot(weights) + bias + noise;
        Self::new("Synthetic Linear Dataset", features, labels)
    }

    /// Random features in `[-1, 1]` labelled 1 when `X·w + b > 0`, else 0.
    pub fn synthetic_classification(
        n_samples: usize,
        weights: &Vector,
        bias: f64,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let features = Matrix::random_using(
            (n_samples, weights.len()),
            Uniform::new_inclusive(-1.0, 1.0),
            &mut rng,
        );

        let mut labels = features.dot(weights) + bias;
        Zip::from(&mut labels).for_each(|z| *z = if *z > 0.0 { 1.0 } else { 0.0 });

        Self::new("Synthetic Classification Dataset", features, labels)
    }
}
