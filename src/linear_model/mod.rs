//! Polynomial linear and logistic regression models.
//!
//! This module provides:
//! - `polynomial_terms`: enumeration of the monomials used as engineered features
//! - `RegressionModel`: hypothesis, cost and gradient over those monomials,
//!   for either a `Linear` or a `Logistic` `RegressionType`
//!
//! Models hold no parameters. Weights and bias live in the `Trainer`.
//!
//! # Examples
//!
//! ## Hypothesis
//! ```rust
//! use polyfit::RegressionModel;
//! use ndarray::array;
//!
//! let model = RegressionModel::parabola_linear();
//! assert_eq!(model.weights_count(1).unwrap(), 2);
//!
//! // w1 * x1 + w2 * x1^2 + b
//! let h = model.hypothesis(&array![1.0, 2.0], array![3.0].view(), 1.0).unwrap();
//! assert_eq!(h, 22.0);
//! ```
//!
//! ## Cost and gradient
//! ```rust
//! use polyfit::RegressionModel;
//! use ndarray::array;
//!
//! let model = RegressionModel::simple_linear();
//! let x = array![[1.0], [2.0]];
//! let y = array![1.0, 3.0];
//!
//! let cost = model.cost(&x, &y, &array![2.0], 1.0).unwrap();
//! let (weights_gradient, bias_gradient) = model.gradient(&x, &y, &array![2.0], 1.0).unwrap();
//! assert_eq!(cost, 2.0);
//! assert_eq!(weights_gradient.len(), 1);
//! assert_eq!(bias_gradient, 2.0);
//! ```

mod model;
mod terms;

pub use model::{RegressionModel, RegressionType, sigmoid};
pub use terms::{Term, polynomial_terms};
