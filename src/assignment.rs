//! # Variational Assignment Distribution
//!
//! Each observation is generated by exactly one (unknown) row of the
//! latent function. The variational posterior over that discrete choice is
//! a categorical distribution per observation, parameterized by a matrix
//! of logits and realized as a row-stochastic responsibility matrix via a
//! softmax. Responsibilities are squashed slightly toward the interior of
//! the simplex so that downstream logs and divisions never see an exact
//! zero or one.

use ndarray::{Array2, ArrayView2, Axis};

/// Weight of the uniform mixing used to squash responsibilities away from
/// the simplex boundary. Bound values depend on this constant; changing it
/// changes the objective.
pub const SQUASH: f64 = 1e-6;

/// Row softmax of the assignment logits followed by the squashing
/// transform `(1 - 2e-6) * phi + 1e-6`.
///
/// The softmax subtracts the row maximum before exponentiating, so logits
/// of magnitude 1e6 produce finite, strictly interior probabilities. The
/// squash perturbs each row sum away from 1 by `(n_candidates - 2) * 1e-6`.
pub fn responsibilities(log_phi: ArrayView2<f64>) -> Array2<f64> {
    let mut phi = log_phi.to_owned();
    for mut row in phi.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let total: f64 = row.sum();
        row.mapv_inplace(|v| v / total);
    }
    phi.mapv_inplace(|p| (1.0 - 2.0 * SQUASH) * p + SQUASH);
    phi
}

/// Uniform assignment prior over the candidate latent inputs: every
/// observation row is `1 / n_candidates`.
pub fn uniform_prior(n_observations: usize, n_candidates: usize) -> Array2<f64> {
    Array2::from_elem(
        (n_observations, n_candidates),
        1.0 / n_candidates as f64,
    )
}

/// Logits whose softmax concentrates almost all mass on one candidate per
/// observation. Useful for initializing a known (hard) assignment.
///
/// # Panics
///
/// Panics if any assignment index is not below `n_candidates`.
pub fn one_hot_log_phi(assignments: &[usize], n_candidates: usize) -> Array2<f64> {
    let mut log_phi = Array2::zeros((assignments.len(), n_candidates));
    for (row, &j) in assignments.iter().enumerate() {
        assert!(
            j < n_candidates,
            "assignment {j} for observation {row} is out of range for {n_candidates} candidates"
        );
        log_phi[(row, j)] = 50.0;
    }
    log_phi
}

/// KL divergence between the categorical variational posterior and its
/// prior, summed over observations: `sum(phi * (ln phi - ln prior))`.
///
/// Callers pass squashed responsibilities, so every entry of `phi` is
/// strictly positive; the prior must be strictly positive too.
pub fn assignment_kl(phi: ArrayView2<f64>, prior: ArrayView2<f64>) -> f64 {
    let mut kl = 0.0;
    for (p, q) in phi.iter().zip(prior.iter()) {
        kl += p * (p.ln() - q.ln());
    }
    kl
}

/// Total responsibility mass assigned to each candidate latent input
/// across all observations (column sums of `phi`).
pub fn column_mass(phi: ArrayView2<f64>) -> ndarray::Array1<f64> {
    phi.sum_axis(Axis(0))
}
