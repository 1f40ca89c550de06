//! Configuration for covariance estimation and inverse construction.

use std::env;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CV_FOLDS, DEFAULT_DEPTH_LIMIT, DEFAULT_LCMV_REG};
use crate::covariance::Tolerance;

/// Engine-wide configuration.
///
/// Per-call parameters (orientation choice, loose, depth) live in
/// [`LcmvSettings`](crate::beamformer::LcmvSettings) and
/// [`InverseSettings`](crate::minimum_norm::InverseSettings); this struct holds
/// the knobs that are usually fixed for a whole analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Cross-validation folds for covariance model selection (default: 3).
    pub cv_folds: usize,

    /// Seed for the fold shuffle (default: 0).
    pub seed: u64,

    /// Singular-value tolerance for automatic rank estimation (default: Auto).
    pub rank_tolerance: Tolerance,

    /// LCMV diagonal loading fraction (default: 0.05).
    pub lcmv_reg: f64,

    /// Maximum amplitude ratio between depth weights (default: 10.0).
    pub depth_limit: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cv_folds: DEFAULT_CV_FOLDS,
            seed: 0,
            rank_tolerance: Tolerance::Auto,
            lcmv_reg: DEFAULT_LCMV_REG,
            depth_limit: DEFAULT_DEPTH_LIMIT,
        }
    }
}

impl Config {
    /// Create with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for small synthetic problems and tests: two folds, fixed seed.
    pub fn quick() -> Self {
        Self {
            cv_folds: 2,
            seed: 42,
            ..Self::default()
        }
    }

    /// Set the number of cross-validation folds.
    pub fn cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    /// Set the fold-shuffle seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the rank-estimation tolerance.
    pub fn rank_tolerance(mut self, tol: Tolerance) -> Self {
        self.rank_tolerance = tol;
        self
    }

    /// Set the LCMV diagonal loading fraction.
    pub fn lcmv_reg(mut self, reg: f64) -> Self {
        self.lcmv_reg = reg;
        self
    }

    /// Set the depth-weight limit.
    pub fn depth_limit(mut self, limit: f64) -> Self {
        self.depth_limit = limit;
        self
    }

    /// Merge configuration from environment variables.
    ///
    /// Recognized: `MEG_INVERSE_CV_FOLDS`, `MEG_INVERSE_SEED`,
    /// `MEG_INVERSE_RANK_TOL` (`auto` or a relative tolerance),
    /// `MEG_INVERSE_LCMV_REG`, `MEG_INVERSE_DEPTH_LIMIT`. Unparseable values
    /// are ignored.
    pub fn from_env(mut self) -> Self {
        if let Some(folds) = parse_usize_env("MEG_INVERSE_CV_FOLDS") {
            self = self.cv_folds(folds);
        }
        if let Some(seed) = parse_u64_env("MEG_INVERSE_SEED") {
            self = self.seed(seed);
        }
        if let Some(tol) = parse_tolerance_env("MEG_INVERSE_RANK_TOL") {
            self = self.rank_tolerance(tol);
        }
        if let Some(reg) = parse_f64_env("MEG_INVERSE_LCMV_REG") {
            self = self.lcmv_reg(reg);
        }
        if let Some(limit) = parse_f64_env("MEG_INVERSE_DEPTH_LIMIT") {
            self = self.depth_limit(limit);
        }
        tracing::debug!(?self, "configuration merged from environment");
        self
    }
}

fn parse_usize_env(key: &str) -> Option<usize> {
    env::var(key).ok()?.parse().ok()
}

fn parse_u64_env(key: &str) -> Option<u64> {
    env::var(key).ok()?.parse().ok()
}

fn parse_f64_env(key: &str) -> Option<f64> {
    env::var(key).ok()?.parse().ok()
}

fn parse_tolerance_env(key: &str) -> Option<Tolerance> {
    let raw = env::var(key).ok()?;
    if raw.eq_ignore_ascii_case("auto") {
        return Some(Tolerance::Auto);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|t| *t > 0.0)
        .map(Tolerance::Relative)
}
