//! # Observation Likelihood
//!
//! The assignment model assumes isotropic Gaussian observation noise. The
//! only thing the core reads from the likelihood is the noise variance,
//! and the strict-positivity invariant on that variance lives here, not in
//! the evaluators.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LikelihoodError {
    #[error("noise variance must be strictly positive, got {0}")]
    NonPositiveVariance(f64),
}

/// Gaussian likelihood `y ~ N(f, variance * I)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gaussian {
    variance: f64,
}

impl Gaussian {
    pub fn new(variance: f64) -> Result<Self, LikelihoodError> {
        if variance <= 0.0 {
            return Err(LikelihoodError::NonPositiveVariance(variance));
        }
        Ok(Self { variance })
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn set_variance(&mut self, variance: f64) -> Result<(), LikelihoodError> {
        if variance <= 0.0 {
            return Err(LikelihoodError::NonPositiveVariance(variance));
        }
        self.variance = variance;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_variance() {
        assert!(Gaussian::new(0.0).is_err());
        assert!(Gaussian::new(-0.1).is_err());

        let mut lik = Gaussian::new(0.5).unwrap();
        assert!(lik.set_variance(0.0).is_err());
        // A failed update leaves the previous value in place.
        assert_eq!(lik.variance(), 0.5);
    }
}
