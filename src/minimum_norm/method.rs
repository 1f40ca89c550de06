//! Noise-normalization policies applied on top of the shared MNE solve.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_SNR;

/// Minimum-norm flavour: which per-location normalization follows the solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InverseMethod {
    /// Plain minimum-norm current estimate.
    Mne,
    /// Dynamic statistical parametric mapping: divide by the noise standard
    /// deviation of each location.
    #[default]
    Dspm,
    /// Standardized LORETA: divide by the square root of the resolution
    /// matrix diagonal.
    SLoreta,
}

impl InverseMethod {
    /// Short name used in logs and summaries.
    pub fn name(self) -> &'static str {
        match self {
            InverseMethod::Mne => "MNE",
            InverseMethod::Dspm => "dSPM",
            InverseMethod::SLoreta => "sLORETA",
        }
    }

    /// Variance of one kernel row, or `None` when no normalization applies.
    ///
    /// `leads` is the row of the eigen-leads `V`, `sing` the singular values,
    /// `reg` the regularized inverse values `s / (s² + λ²)` and `prior` the
    /// row's source prior.
    pub(crate) fn row_variance(
        self,
        leads: &[f64],
        sing: &[f64],
        reg: &[f64],
        prior: f64,
        nave: f64,
    ) -> Option<f64> {
        match self {
            InverseMethod::Mne => None,
            InverseMethod::Dspm => {
                let sum: f64 = leads.iter().zip(reg).map(|(v, r)| v * v * r * r).sum();
                Some(prior / nave * sum)
            }
            InverseMethod::SLoreta => {
                let sum: f64 = leads
                    .iter()
                    .zip(sing.iter().zip(reg))
                    .map(|(v, (s, r))| v * v * s * r)
                    .sum();
                Some(prior * sum)
            }
        }
    }
}

/// Regularization `λ² = 1 / SNR²`.
pub fn lambda2_from_snr(snr: f64) -> f64 {
    1.0 / (snr * snr)
}

/// `λ²` for the default evoked SNR of 3.
pub fn default_lambda2() -> f64 {
    lambda2_from_snr(DEFAULT_SNR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variances() {
        let leads = [0.6, 0.8];
        let sing = [2.0, 1.0];
        let reg = [0.4, 0.5];
        assert_eq!(InverseMethod::Mne.row_variance(&leads, &sing, &reg, 1.0, 1.0), None);

        let dspm = InverseMethod::Dspm.row_variance(&leads, &sing, &reg, 2.0, 4.0).unwrap();
        assert!((dspm - 0.5 * (0.36 * 0.16 + 0.64 * 0.25)).abs() < 1e-12);

        let slor = InverseMethod::SLoreta.row_variance(&leads, &sing, &reg, 2.0, 4.0).unwrap();
        assert!((slor - 2.0 * (0.36 * 0.8 + 0.64 * 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_lambda2() {
        assert!((default_lambda2() - 1.0 / 9.0).abs() < 1e-15);
    }
}
