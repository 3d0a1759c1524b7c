//! # Base Assignment-GP Model State
//!
//! [`AssignGp`] owns the shared state of the assignment GP: the expanded
//! candidate inputs, the observations, the variational assignment logits
//! and their prior, and the kernel and likelihood capabilities. The sparse
//! evaluator composes this state rather than inheriting from it; it reads
//! everything through accessors and never mutates it, while an external
//! optimizer updates the logits and hyperparameters between evaluations
//! through the mutable accessors.
//!
//! All shape couplings between the pieces are validated once here, at
//! construction, so the evaluators can assume consistent dimensions.

use crate::assignment;
use crate::kernel::{Kernel, KernelError};
use crate::likelihood::{Gaussian, LikelihoodError};
use ndarray::{Array2, ArrayView2};
use ndarray_linalg::error::LinalgError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Explicit numerical-safety configuration for the evaluators.
///
/// The default jitter of 1e-6 must be kept in lockstep with the squashing
/// weight in [`crate::assignment::SQUASH`] for behavioral parity of bound
/// values across deployments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Numerics {
    /// Constant added to the diagonal of the inducing kernel matrix before
    /// Cholesky factorization.
    pub jitter: f64,
}

impl Default for Numerics {
    fn default() -> Self {
        Self { jitter: 1e-6 }
    }
}

/// Errors from model construction and bound/predictive evaluation.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("kernel configuration rejected: {0}")]
    Kernel(#[from] KernelError),

    #[error("likelihood configuration rejected: {0}")]
    Likelihood(#[from] LikelihoodError),

    #[error(
        "assignment logits have {logit_rows} rows but there are {observations} observations"
    )]
    ObservationCountMismatch {
        logit_rows: usize,
        observations: usize,
    },

    #[error(
        "assignment logits have {logit_cols} columns but there are {candidates} candidate inputs"
    )]
    CandidateCountMismatch { logit_cols: usize, candidates: usize },

    #[error("assignment prior shape {prior:?} does not match the logits shape {logits:?}")]
    PriorShapeMismatch {
        prior: (usize, usize),
        logits: (usize, usize),
    },

    #[error(
        "assignment prior entry ({row}, {col}) is {value}; every prior probability must be strictly positive and finite"
    )]
    InvalidPriorEntry { row: usize, col: usize, value: f64 },

    #[error(
        "inducing inputs have {inducing} feature columns but the expanded inputs have {expanded}"
    )]
    FeatureDimMismatch { inducing: usize, expanded: usize },

    #[error(
        "new inputs have {new} feature columns but the model was built on {expected}-dimensional inputs"
    )]
    PredictionDimMismatch { new: usize, expected: usize },

    #[error(
        "Cholesky factorization of the {matrix} matrix failed; the kernel/noise configuration is degenerate: {source}"
    )]
    FactorizationFailed {
        matrix: &'static str,
        source: LinalgError,
    },

    #[error("triangular solve failed: {0}")]
    TriangularSolve(LinalgError),
}

/// Shared state of the assignment GP.
///
/// Shapes: expanded inputs `(n_candidates, n_features)`, observations
/// `(n_observations, n_outputs)`, logits and prior
/// `(n_observations, n_candidates)`.
pub struct AssignGp<K: Kernel> {
    x_expanded: Array2<f64>,
    y: Array2<f64>,
    log_phi: Array2<f64>,
    phi_prior: Array2<f64>,
    kernel: K,
    likelihood: Gaussian,
}

impl<K: Kernel> AssignGp<K> {
    /// Builds the base model, validating every shape coupling and the
    /// strict positivity of the assignment prior. The prior defaults to
    /// uniform over candidates when `phi_prior` is `None`.
    pub fn new(
        x_expanded: Array2<f64>,
        y: Array2<f64>,
        log_phi: Array2<f64>,
        phi_prior: Option<Array2<f64>>,
        kernel: K,
        likelihood: Gaussian,
    ) -> Result<Self, ModelError> {
        if log_phi.nrows() != y.nrows() {
            return Err(ModelError::ObservationCountMismatch {
                logit_rows: log_phi.nrows(),
                observations: y.nrows(),
            });
        }
        if log_phi.ncols() != x_expanded.nrows() {
            return Err(ModelError::CandidateCountMismatch {
                logit_cols: log_phi.ncols(),
                candidates: x_expanded.nrows(),
            });
        }
        let phi_prior = phi_prior
            .unwrap_or_else(|| assignment::uniform_prior(log_phi.nrows(), log_phi.ncols()));
        if phi_prior.dim() != log_phi.dim() {
            return Err(ModelError::PriorShapeMismatch {
                prior: phi_prior.dim(),
                logits: log_phi.dim(),
            });
        }
        // The KL term takes the log of every prior entry; a zero or NaN
        // prior is a configuration error, not a numerical edge case.
        for ((row, col), &value) in phi_prior.indexed_iter() {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ModelError::InvalidPriorEntry { row, col, value });
            }
        }
        Ok(Self {
            x_expanded,
            y,
            log_phi,
            phi_prior,
            kernel,
            likelihood,
        })
    }

    pub fn x_expanded(&self) -> ArrayView2<'_, f64> {
        self.x_expanded.view()
    }

    pub fn y(&self) -> ArrayView2<'_, f64> {
        self.y.view()
    }

    pub fn log_phi(&self) -> ArrayView2<'_, f64> {
        self.log_phi.view()
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut K {
        &mut self.kernel
    }

    pub fn likelihood(&self) -> &Gaussian {
        &self.likelihood
    }

    pub fn likelihood_mut(&mut self) -> &mut Gaussian {
        &mut self.likelihood
    }

    /// Replaces the variational assignment logits (the optimizer's update
    /// path). The replacement must keep the `(observations, candidates)`
    /// shape fixed at construction.
    pub fn set_log_phi(&mut self, log_phi: Array2<f64>) -> Result<(), ModelError> {
        if log_phi.nrows() != self.log_phi.nrows() {
            return Err(ModelError::ObservationCountMismatch {
                logit_rows: log_phi.nrows(),
                observations: self.log_phi.nrows(),
            });
        }
        if log_phi.ncols() != self.log_phi.ncols() {
            return Err(ModelError::CandidateCountMismatch {
                logit_cols: log_phi.ncols(),
                candidates: self.log_phi.ncols(),
            });
        }
        self.log_phi = log_phi;
        Ok(())
    }

    /// KL divergence between the (squashed) responsibilities and the
    /// assignment prior.
    pub fn assignment_kl(&self, phi: ArrayView2<f64>) -> f64 {
        assignment::assignment_kl(phi, self.phi_prior.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::SquaredExponential;
    use ndarray::Array2;

    fn kernel() -> SquaredExponential {
        SquaredExponential::new(1.0, 1.0).unwrap()
    }

    #[test]
    fn accepts_consistent_shapes() {
        let model = AssignGp::new(
            Array2::zeros((6, 2)),
            Array2::zeros((4, 1)),
            Array2::zeros((4, 6)),
            None,
            kernel(),
            Gaussian::new(0.1).unwrap(),
        );
        assert!(model.is_ok());
    }

    #[test]
    fn rejects_logit_observation_mismatch() {
        let model = AssignGp::new(
            Array2::zeros((6, 2)),
            Array2::zeros((5, 1)),
            Array2::zeros((4, 6)),
            None,
            kernel(),
            Gaussian::new(0.1).unwrap(),
        );
        assert!(matches!(
            model,
            Err(ModelError::ObservationCountMismatch { .. })
        ));
    }

    #[test]
    fn rejects_logit_candidate_mismatch() {
        let model = AssignGp::new(
            Array2::zeros((6, 2)),
            Array2::zeros((4, 1)),
            Array2::zeros((4, 5)),
            None,
            kernel(),
            Gaussian::new(0.1).unwrap(),
        );
        assert!(matches!(
            model,
            Err(ModelError::CandidateCountMismatch { .. })
        ));
    }

    #[test]
    fn rejects_prior_with_zero_probability() {
        let mut prior = crate::assignment::uniform_prior(4, 6);
        prior[(2, 3)] = 0.0;
        let model = AssignGp::new(
            Array2::zeros((6, 2)),
            Array2::zeros((4, 1)),
            Array2::zeros((4, 6)),
            Some(prior),
            kernel(),
            Gaussian::new(0.1).unwrap(),
        );
        assert!(matches!(
            model,
            Err(ModelError::InvalidPriorEntry {
                row: 2,
                col: 3,
                ..
            })
        ));
    }

    #[test]
    fn rejects_prior_with_non_finite_entry() {
        let mut prior = crate::assignment::uniform_prior(4, 6);
        prior[(0, 0)] = f64::NAN;
        let model = AssignGp::new(
            Array2::zeros((6, 2)),
            Array2::zeros((4, 1)),
            Array2::zeros((4, 6)),
            Some(prior),
            kernel(),
            Gaussian::new(0.1).unwrap(),
        );
        assert!(matches!(model, Err(ModelError::InvalidPriorEntry { .. })));
    }

    #[test]
    fn rejects_prior_shape_mismatch() {
        let model = AssignGp::new(
            Array2::zeros((6, 2)),
            Array2::zeros((4, 1)),
            Array2::zeros((4, 6)),
            Some(Array2::from_elem((4, 5), 0.2)),
            kernel(),
            Gaussian::new(0.1).unwrap(),
        );
        assert!(matches!(model, Err(ModelError::PriorShapeMismatch { .. })));
    }

    #[test]
    fn set_log_phi_rejects_reshape() {
        let mut model = AssignGp::new(
            Array2::zeros((6, 2)),
            Array2::zeros((4, 1)),
            Array2::zeros((4, 6)),
            None,
            kernel(),
            Gaussian::new(0.1).unwrap(),
        )
        .unwrap();
        assert!(model.set_log_phi(Array2::zeros((4, 7))).is_err());
        assert!(model.set_log_phi(Array2::ones((4, 6))).is_ok());
    }
}
