//! Inverse operator construction parameters.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::constants::{DEFAULT_DEPTH, DEFAULT_DEPTH_LIMIT, DEFAULT_LOOSE};
use crate::error::{Error, Result};

/// Priors and rank used by [`make_inverse_operator`](super::make_inverse_operator).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InverseSettings {
    /// Tangential orientation prior relative to the normal one, in `[0, 1]`.
    /// `0` gives a fixed-orientation solution, `1` a free one.
    pub loose: f64,

    /// Depth-weighting exponent; `0` disables depth weighting.
    pub depth: f64,

    /// Maximum amplitude ratio between leadfield norms entering the depth
    /// prior.
    pub depth_limit: f64,

    /// Noise covariance rank override.
    pub rank: Option<usize>,
}

impl Default for InverseSettings {
    fn default() -> Self {
        Self {
            loose: DEFAULT_LOOSE,
            depth: DEFAULT_DEPTH,
            depth_limit: DEFAULT_DEPTH_LIMIT,
            rank: None,
        }
    }
}

impl InverseSettings {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with the depth limit taken from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            depth_limit: config.depth_limit,
            ..Self::default()
        }
    }

    /// Set the orientation looseness.
    pub fn loose(mut self, loose: f64) -> Self {
        self.loose = loose;
        self
    }

    /// Set the depth-weighting exponent.
    pub fn depth(mut self, depth: f64) -> Self {
        self.depth = depth;
        self
    }

    /// Set the depth limit.
    pub fn depth_limit(mut self, limit: f64) -> Self {
        self.depth_limit = limit;
        self
    }

    /// Override the noise covariance rank.
    pub fn rank(mut self, rank: usize) -> Self {
        self.rank = Some(rank);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.loose) {
            return Err(Error::invalid("loose", format!("{} outside [0, 1]", self.loose)));
        }
        if !(self.depth.is_finite() && self.depth >= 0.0) {
            return Err(Error::invalid("depth", format!("{} must be non-negative", self.depth)));
        }
        if !(self.depth_limit.is_finite() && self.depth_limit >= 1.0) {
            return Err(Error::invalid(
                "depth_limit",
                format!("{} must be at least 1", self.depth_limit),
            ));
        }
        Ok(())
    }
}
