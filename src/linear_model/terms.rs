use ndarray::ArrayView1;

use crate::error::{RegressionError, Result};

/// One monomial of the polynomial expansion, stored as one exponent per feature.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Term(Vec<u32>);

impl Term {
    pub fn new(exponents: Vec<u32>) -> Self {
        Self(exponents)
    }

    pub fn exponents(&self) -> &[u32] {
        &self.0
    }

    pub fn degree(&self) -> u32 {
        self.0.iter().sum()
    }

    /// Value of the monomial at `x`. Features with a zero exponent are skipped.
    pub fn evaluate(&self, x: ArrayView1<f64>) -> f64 {
        self.0
            .iter()
            .zip(x.iter())
            .filter(|(exponent, _)| **exponent > 0)
            .map(|(&exponent, &value)| value.powi(exponent as i32))
            .product()
    }
}

/// Enumerates every exponent tuple of length `feature_count` whose total degree
/// lies in `1..=max_degree`.
///
/// The order is a depth-first walk over feature positions, trying exponents in
/// ascending order at each position. Weights are paired with terms by position,
/// so this order must never change.
pub fn polynomial_terms(feature_count: usize, max_degree: u32) -> Result<Vec<Term>> {
    if feature_count == 0 || max_degree == 0 {
        return Err(RegressionError::InvalidDimensions {
            feature_count,
            max_degree,
        });
    }

    let mut terms = Vec::new();
    let mut current = Vec::with_capacity(feature_count);
    generate(&mut current, feature_count, max_degree, &mut terms);
    Ok(terms)
}

fn generate(current: &mut Vec<u32>, feature_count: usize, remaining: u32, terms: &mut Vec<Term>) {
    if current.len() == feature_count {
        if current.iter().sum::<u32>() >= 1 {
            terms.push(Term(current.clone()));
        }
        return;
    }

    for exponent in 0..=remaining {
        current.push(exponent);
        generate(current, feature_count, remaining - exponent, terms);
        current.pop();
    }
}
