#![deny(dead_code)]
#![deny(unused_imports)]

//! # assigngp
//!
//! Sparse variational Gaussian process regression in which the assignment
//! of each observation to a latent function value is itself unknown and
//! inferred probabilistically.
//!
//! Let `f` be a vector of GP function values over an expanded set of
//! candidate inputs, and let each observation be a noisy realization of
//! one (unknown) entry of `f`. A categorical variational distribution over
//! the assignments, parameterized by a logit matrix, is optimized jointly
//! with the kernel hyperparameters and the noise variance by maximizing an
//! evidence lower bound. Inducing points keep the kernel algebra low-rank;
//! they are frozen at construction and never optimized.
//!
//! The crate exposes two entry points on
//! [`sparse::SparseAssignGp`]: `bound()` (the scalar objective an external
//! optimizer maximizes) and `predict()` (the posterior mean and variance at
//! new inputs once optimization has converged).

pub mod assignment;
pub mod kernel;
pub mod likelihood;
pub mod model;
pub mod sparse;
