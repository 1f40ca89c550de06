//! Regularized channel covariance estimation.
//!
//! This module provides:
//! - Empirical covariance accumulated window by window (Welford / Chan merge)
//! - Ledoit-Wolf shrinkage and fixed diagonal loading
//! - Cross-validated model selection by held-out Gaussian log-likelihood
//! - Explicit, injectable rank estimation

mod cross_validation;
mod estimator;
mod matrix;
mod rank;
mod shrinkage;
mod welford;

pub use cross_validation::{gaussian_log_likelihood, kfold_splits};
pub use estimator::CovarianceEstimator;
pub use matrix::{CovarianceMatrix, CovarianceMethod};
pub use rank::{estimate_rank, matrix_rank, rank_from_spectrum, RankEstimate, RankMode, Tolerance};
pub use shrinkage::{diagonal_loading, ledoit_wolf};
pub use welford::WelfordCovariance;
