//! # Covariance Kernels
//!
//! The model core never evaluates covariances directly; it talks to a
//! [`Kernel`] capability that supplies pairwise cross-covariances and
//! marginal variances. Concrete kernels own their hyperparameters and
//! expose them mutably so an external optimizer can update them between
//! bound evaluations without rebuilding the model.

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when constructing or updating a kernel.
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("kernel variance must be strictly positive, got {0}")]
    NonPositiveVariance(f64),

    #[error("kernel lengthscale must be strictly positive, got {0}")]
    NonPositiveLengthscale(f64),
}

/// Pairwise covariance evaluation over rows of dense input matrices.
///
/// Inputs are `(n_points, n_features)` matrices; every implementation must
/// accept any pair of inputs that agree on `n_features`.
pub trait Kernel {
    /// Cross-covariance matrix between the rows of `a` and the rows of `b`,
    /// with shape `(a.nrows(), b.nrows())`.
    fn k(&self, a: ArrayView2<f64>, b: ArrayView2<f64>) -> Array2<f64>;

    /// Marginal variance at each row of `a` (the diagonal of `k(a, a)`
    /// without forming the full matrix).
    fn k_diag(&self, a: ArrayView2<f64>) -> Array1<f64>;
}

/// The squared-exponential (RBF) kernel:
/// `k(x, x') = variance * exp(-||x - x'||^2 / (2 * lengthscale^2))`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquaredExponential {
    variance: f64,
    lengthscale: f64,
}

impl SquaredExponential {
    pub fn new(variance: f64, lengthscale: f64) -> Result<Self, KernelError> {
        if variance <= 0.0 {
            return Err(KernelError::NonPositiveVariance(variance));
        }
        if lengthscale <= 0.0 {
            return Err(KernelError::NonPositiveLengthscale(lengthscale));
        }
        Ok(Self {
            variance,
            lengthscale,
        })
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn lengthscale(&self) -> f64 {
        self.lengthscale
    }

    pub fn set_variance(&mut self, variance: f64) -> Result<(), KernelError> {
        if variance <= 0.0 {
            return Err(KernelError::NonPositiveVariance(variance));
        }
        self.variance = variance;
        Ok(())
    }

    pub fn set_lengthscale(&mut self, lengthscale: f64) -> Result<(), KernelError> {
        if lengthscale <= 0.0 {
            return Err(KernelError::NonPositiveLengthscale(lengthscale));
        }
        self.lengthscale = lengthscale;
        Ok(())
    }
}

impl Kernel for SquaredExponential {
    fn k(&self, a: ArrayView2<f64>, b: ArrayView2<f64>) -> Array2<f64> {
        let inv_two_ell2 = 1.0 / (2.0 * self.lengthscale * self.lengthscale);
        let mut out = Array2::zeros((a.nrows(), b.nrows()));
        for (i, ai) in a.rows().into_iter().enumerate() {
            for (j, bj) in b.rows().into_iter().enumerate() {
                let mut sq_dist = 0.0;
                for (&x, &y) in ai.iter().zip(bj.iter()) {
                    let d = x - y;
                    sq_dist += d * d;
                }
                out[(i, j)] = self.variance * (-sq_dist * inv_two_ell2).exp();
            }
        }
        out
    }

    fn k_diag(&self, a: ArrayView2<f64>) -> Array1<f64> {
        Array1::from_elem(a.nrows(), self.variance)
    }
}
