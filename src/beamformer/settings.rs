//! Per-call LCMV parameters.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::constants::DEFAULT_LCMV_REG;
use crate::error::{Error, Result};
use crate::types::PickOri;

/// Normalization of the spatial filter weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeightNorm {
    /// `wᵀ L = 1`: unit response to a source of unit amplitude.
    #[default]
    UnitGain,
    /// Rows scaled to unit norm in whitened space: unit response to noise.
    UnitNoiseGain,
}

/// LCMV beamformer settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LcmvSettings {
    /// Diagonal loading of the data covariance, as a fraction of its mean
    /// retained eigenvalue.
    pub reg: f64,
    /// Output orientation.
    pub pick_ori: PickOri,
    /// Weight normalization.
    pub weight_norm: WeightNorm,
}

impl Default for LcmvSettings {
    fn default() -> Self {
        Self {
            reg: DEFAULT_LCMV_REG,
            pick_ori: PickOri::None,
            weight_norm: WeightNorm::UnitGain,
        }
    }
}

impl LcmvSettings {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with the loading taken from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            reg: config.lcmv_reg,
            ..Self::default()
        }
    }

    /// Set the diagonal loading fraction.
    pub fn reg(mut self, reg: f64) -> Self {
        self.reg = reg;
        self
    }

    /// Set the output orientation.
    pub fn pick_ori(mut self, pick_ori: PickOri) -> Self {
        self.pick_ori = pick_ori;
        self
    }

    /// Set the weight normalization.
    pub fn weight_norm(mut self, weight_norm: WeightNorm) -> Self {
        self.weight_norm = weight_norm;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.reg.is_finite() && self.reg >= 0.0) {
            return Err(Error::invalid("reg", format!("{} must be non-negative", self.reg)));
        }
        Ok(())
    }
}
