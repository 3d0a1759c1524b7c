//! # Sparse Bound and Predictive Evaluators
//!
//! The evidence lower bound and the posterior predictive of the assignment
//! GP share one low-rank reduction: factor the jittered inducing kernel,
//! push the cross-kernel through the responsibility-weighted projection,
//! and factor the resulting rank correction. [`SparseAssignGp`] computes
//! that reduction once per evaluation and feeds it to both evaluators.
//!
//! Every evaluation is a pure function of the current parameter snapshot:
//! the model is never mutated here, results are freshly owned, and
//! distinct snapshots can be evaluated in parallel by the caller. Cost is
//! dominated by the two Cholesky factorizations and the triangular solves,
//! `O(M^3 + M^2 N')` for `M` inducing points and `N'` candidates.

use crate::assignment;
use crate::kernel::Kernel;
use crate::model::{AssignGp, ModelError, Numerics};
use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};
use ndarray_linalg::{Cholesky, Diag, SolveTriangular, UPLO};

/// Posterior predictive variance, broadcast identically across the output
/// dimensions (the model assumes output-dimension-independent covariance).
#[derive(Debug, Clone)]
pub enum Variance {
    /// Pointwise variances, shape `(n_new, n_outputs)`.
    Pointwise(Array2<f64>),
    /// Full covariance per output dimension, shape `(n_new, n_new, n_outputs)`.
    Full(Array3<f64>),
}

/// Posterior predictive at a set of new input locations.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Predictive mean, shape `(n_new, n_outputs)`.
    pub mean: Array2<f64>,
    pub variance: Variance,
}

/// Low-rank state shared by the bound and predictive evaluators.
struct SparseReduction {
    /// Lower Cholesky factor of `Kuu + jitter * I`.
    l: Array2<f64>,
    /// Column sums of the responsibilities: mass assigned to each candidate.
    column_mass: Array1<f64>,
    /// `L^-1 Kuf` scaled by `sqrt(column_mass) / sigma`.
    w: Array2<f64>,
    /// Lower Cholesky factor of `W W^T + I`.
    r: Array2<f64>,
    /// Projected targets `R^-1 (L^-1 Kuf) Phi^T Y / sigma^2`, shape `(m, n_outputs)`.
    c: Array2<f64>,
}

/// Sparse variational assignment GP with frozen inducing inputs.
///
/// Composes the base [`AssignGp`] state with an inducing input set that is
/// fixed for the lifetime of the model (inducing points are not trainable
/// here). The two public entry points are [`bound`](Self::bound), called
/// once per optimizer step, and [`predict`](Self::predict), called after
/// convergence.
pub struct SparseAssignGp<K: Kernel> {
    base: AssignGp<K>,
    z_expanded: Array2<f64>,
    numerics: Numerics,
}

impl<K: Kernel> SparseAssignGp<K> {
    /// Builds the sparse model. Fails if the inducing inputs do not share
    /// the feature dimensionality of the expanded inputs.
    pub fn new(
        base: AssignGp<K>,
        z_expanded: Array2<f64>,
        numerics: Numerics,
    ) -> Result<Self, ModelError> {
        if z_expanded.ncols() != base.x_expanded().ncols() {
            return Err(ModelError::FeatureDimMismatch {
                inducing: z_expanded.ncols(),
                expanded: base.x_expanded().ncols(),
            });
        }
        Ok(Self {
            base,
            z_expanded,
            numerics,
        })
    }

    pub fn base(&self) -> &AssignGp<K> {
        &self.base
    }

    /// Mutable access to the shared parameter state (logits, kernel,
    /// likelihood) for the external optimizer. The inducing inputs stay
    /// frozen.
    pub fn base_mut(&mut self) -> &mut AssignGp<K> {
        &mut self.base
    }

    pub fn z_expanded(&self) -> ArrayView2<'_, f64> {
        self.z_expanded.view()
    }

    /// The shared sparse-GP reduction over the current responsibilities.
    fn reduce(&self, phi: &Array2<f64>) -> Result<SparseReduction, ModelError> {
        let kernel = self.base.kernel();
        let sigma2 = self.base.likelihood().variance();
        let sigma = sigma2.sqrt();
        let z = self.z_expanded.view();

        let mut kuu = kernel.k(z, z);
        kuu.diag_mut().mapv_inplace(|v| v + self.numerics.jitter);
        let l = kuu
            .cholesky(UPLO::Lower)
            .map_err(|source| ModelError::FactorizationFailed {
                matrix: "inducing kernel",
                source,
            })?;

        let kuf = kernel.k(z, self.base.x_expanded());
        let li_kuf = l
            .solve_triangular(UPLO::Lower, Diag::NonUnit, &kuf)
            .map_err(ModelError::TriangularSolve)?;

        let column_mass = assignment::column_mass(phi.view());
        let scale = column_mass.mapv(f64::sqrt).insert_axis(Axis(0));
        let w = &li_kuf * &scale / sigma;

        let p = w.dot(&w.t()) + Array2::<f64>::eye(w.nrows());
        let r = p
            .cholesky(UPLO::Lower)
            .map_err(|source| ModelError::FactorizationFailed {
                matrix: "rank correction",
                source,
            })?;

        let projected = li_kuf.dot(&phi.t().dot(&self.base.y()));
        let c = r
            .solve_triangular(UPLO::Lower, Diag::NonUnit, &projected)
            .map_err(ModelError::TriangularSolve)?
            / sigma2;

        Ok(SparseReduction {
            l,
            column_mass,
            w,
            r,
            c,
        })
    }

    /// The trace correction of the bound. Identically zero (up to floating
    /// point) when the inducing inputs coincide with the expanded inputs.
    fn trace_term(&self, reduction: &SparseReduction, sigma2: f64) -> f64 {
        let k_diag = self.base.kernel().k_diag(self.base.x_expanded());
        -0.5 * (&k_diag * &reduction.column_mass).sum() / sigma2
            + 0.5 * reduction.w.mapv(|v| v * v).sum()
    }

    /// Evidence lower bound on the marginal log-likelihood for the current
    /// parameter snapshot. Maximized by the external optimizer.
    ///
    /// A Cholesky failure in the reduction surfaces as
    /// [`ModelError::FactorizationFailed`]; no partial value is returned.
    pub fn bound(&self) -> Result<f64, ModelError> {
        let phi = assignment::responsibilities(self.base.log_phi());
        let reduction = self.reduce(&phi)?;

        let sigma2 = self.base.likelihood().variance();
        let n = self.base.y().nrows() as f64;
        let d = self.base.y().ncols() as f64;

        let trace_term = self.trace_term(&reduction, sigma2);
        log::debug!("sparse assignment bound trace term = {trace_term:.6e}");

        let log_det_r = reduction.r.diag().mapv(|v| (v * v).ln()).sum();
        let data_fit = -0.5 * self.base.y().mapv(|v| v * v).sum() / sigma2
            + 0.5 * reduction.c.mapv(|v| v * v).sum();

        Ok(trace_term
            - 0.5 * n * d * (2.0 * std::f64::consts::PI * sigma2).ln()
            - 0.5 * d * log_det_r
            + data_fit
            - self.base.assignment_kl(phi.view()))
    }

    /// Posterior predictive mean and variance at `x_new`.
    ///
    /// The variance is a Schur-complement-style difference of PSD terms,
    /// non-negative in exact arithmetic; tiny negative values from floating
    /// point are reported as-is rather than clamped.
    pub fn predict(
        &self,
        x_new: ArrayView2<f64>,
        full_cov: bool,
    ) -> Result<Prediction, ModelError> {
        if x_new.ncols() != self.base.x_expanded().ncols() {
            return Err(ModelError::PredictionDimMismatch {
                new: x_new.ncols(),
                expected: self.base.x_expanded().ncols(),
            });
        }

        let phi = assignment::responsibilities(self.base.log_phi());
        let reduction = self.reduce(&phi)?;
        let kernel = self.base.kernel();

        let kus = kernel.k(self.z_expanded.view(), x_new);
        let tmp1 = reduction
            .l
            .solve_triangular(UPLO::Lower, Diag::NonUnit, &kus)
            .map_err(ModelError::TriangularSolve)?;
        let tmp2 = reduction
            .r
            .solve_triangular(UPLO::Lower, Diag::NonUnit, &tmp1)
            .map_err(ModelError::TriangularSolve)?;

        let mean = tmp2.t().dot(&reduction.c);
        let n_new = x_new.nrows();
        let n_outputs = self.base.y().ncols();

        let variance = if full_cov {
            let cov =
                kernel.k(x_new, x_new) + tmp2.t().dot(&tmp2) - tmp1.t().dot(&tmp1);
            Variance::Full(Array3::from_shape_fn((n_new, n_new, n_outputs), |(i, j, _)| {
                cov[(i, j)]
            }))
        } else {
            let pointwise = kernel.k_diag(x_new)
                + tmp2.mapv(|v| v * v).sum_axis(Axis(0))
                - tmp1.mapv(|v| v * v).sum_axis(Axis(0));
            Variance::Pointwise(Array2::from_shape_fn((n_new, n_outputs), |(i, _)| {
                pointwise[i]
            }))
        };

        Ok(Prediction { mean, variance })
    }
}
