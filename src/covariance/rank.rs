//! Numerical rank estimation for covariance matrices.
//!
//! Rank is an explicit policy: the estimator never zeroes small eigenvalues
//! in place, it records how many directions downstream inversion may use.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::linalg::eigh_desc;
use crate::sensor::{ChannelKind, SensorSpace};
use crate::types::Matrix;

/// Multiple of machine epsilon, per channel, used by [`Tolerance::Auto`].
const AUTO_TOL_EPS_FACTOR: f64 = 1e3;

/// Eigenvalue threshold relative to the largest eigenvalue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Tolerance {
    /// `λ_max · p · 10³ · ε` for a `p`-channel matrix.
    #[default]
    Auto,
    /// `λ_max · tol`.
    Relative(f64),
}

impl Tolerance {
    /// Absolute threshold for a spectrum whose largest value is `max`.
    pub fn threshold(&self, max: f64, n: usize) -> f64 {
        match self {
            Tolerance::Auto => max * n as f64 * AUTO_TOL_EPS_FACTOR * f64::EPSILON,
            Tolerance::Relative(tol) => max * tol,
        }
    }
}

/// How the rank of a covariance estimate is determined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum RankMode {
    /// Count eigenvalues above the configured [`Tolerance`], per channel kind.
    #[default]
    Auto,
    /// Caller-supplied rank for every channel kind present.
    PerKind(BTreeMap<ChannelKind, usize>),
    /// Channels minus known constraints.
    Full,
}

/// Rank decision for one covariance estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankEstimate {
    /// Total rank used for whitening and inversion.
    pub total: usize,
    /// Rank per channel kind.
    pub by_kind: BTreeMap<ChannelKind, usize>,
}

/// Number of values in a descending spectrum above the tolerance.
pub fn rank_from_spectrum(values_desc: &[f64], tol: Tolerance) -> usize {
    let Some(&max) = values_desc.first() else {
        return 0;
    };
    if !(max > 0.0) {
        return 0;
    }
    let threshold = tol.threshold(max, values_desc.len());
    values_desc.iter().take_while(|&&v| v > threshold).count()
}

/// Rank of a symmetric PSD matrix.
pub fn matrix_rank(matrix: &Matrix, tol: Tolerance) -> usize {
    let (values, _) = eigh_desc(matrix);
    rank_from_spectrum(values.as_slice(), tol)
}

/// Decide the rank of a (unit-scaled) covariance.
///
/// `n_samples` bounds the rank of a sample covariance (`n_samples − 1`).
/// `Auto` is additionally bounded by the joint rank across kinds, so
/// constraints spanning several kinds are honored.
pub fn estimate_rank(
    scaled_cov: &Matrix,
    sensors: &SensorSpace,
    mode: &RankMode,
    tol: Tolerance,
    n_samples: usize,
) -> Result<RankEstimate> {
    let kinds = sensors.kinds_present();
    match mode {
        RankMode::Auto => {
            let mut by_kind = BTreeMap::new();
            for kind in &kinds {
                let idx = sensors.indices_of(*kind);
                let sub = scaled_cov.select_rows(&idx).select_columns(&idx);
                by_kind.insert(*kind, matrix_rank(&sub, tol));
            }
            let per_kind_total: usize = by_kind.values().sum();
            let joint = matrix_rank(scaled_cov, tol);
            let sample_bound = n_samples.saturating_sub(1);
            let total = per_kind_total
                .min(joint)
                .min(sensors.max_rank())
                .min(sample_bound);
            if total < per_kind_total.min(joint).min(sensors.max_rank()) {
                tracing::warn!(
                    rank = total,
                    n_samples,
                    "covariance rank limited by sample count"
                );
            }
            tracing::debug!(total, joint, ?by_kind, "estimated covariance rank");
            Ok(RankEstimate { total, by_kind })
        }
        RankMode::PerKind(map) => {
            for kind in map.keys() {
                if !kinds.contains(kind) {
                    return Err(Error::RankMismatch {
                        reason: format!("rank given for {} but no such channels", kind.name()),
                    });
                }
            }
            for kind in &kinds {
                let count = sensors.indices_of(*kind).len();
                match map.get(kind) {
                    None => {
                        return Err(Error::RankMismatch {
                            reason: format!("no rank given for {} channels", kind.name()),
                        })
                    }
                    Some(&r) if r == 0 || r > count => {
                        return Err(Error::RankMismatch {
                            reason: format!(
                                "rank {r} for {} outside 1..={count}",
                                kind.name()
                            ),
                        })
                    }
                    Some(_) => {}
                }
            }
            let total: usize = map.values().sum();
            if total > sensors.max_rank() {
                return Err(Error::RankMismatch {
                    reason: format!(
                        "total rank {total} exceeds {} channels minus {} constraints",
                        sensors.len(),
                        sensors.n_constraints()
                    ),
                });
            }
            Ok(RankEstimate {
                total,
                by_kind: map.clone(),
            })
        }
        RankMode::Full => {
            let mut by_kind: BTreeMap<ChannelKind, usize> = kinds
                .iter()
                .map(|k| (*k, sensors.indices_of(*k).len()))
                .collect();
            // Attribute constraints to the largest kind so the map sums to the total.
            if let Some((_, r)) = by_kind.iter_mut().max_by_key(|(_, r)| **r) {
                *r -= sensors.n_constraints().min(*r);
            }
            Ok(RankEstimate {
                total: sensors.max_rank(),
                by_kind,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::Channel;

    fn eeg(n: usize) -> SensorSpace {
        SensorSpace::new(
            (0..n)
                .map(|i| Channel::new(format!("EEG{i:03}"), ChannelKind::Electrode))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_rank_from_spectrum() {
        assert_eq!(rank_from_spectrum(&[3.0, 2.0, 1e-20], Tolerance::Auto), 2);
        assert_eq!(rank_from_spectrum(&[3.0, 2.0, 1e-3], Tolerance::Relative(1e-2)), 2);
        assert_eq!(rank_from_spectrum(&[], Tolerance::Auto), 0);
        assert_eq!(rank_from_spectrum(&[0.0, 0.0], Tolerance::Auto), 0);
    }

    #[test]
    fn test_auto_rank_diagonal() {
        let cov = Matrix::from_diagonal(&crate::types::Vector::from_vec(vec![1.0, 1.0, 0.0, 1.0]));
        let est = estimate_rank(&cov, &eeg(4), &RankMode::Auto, Tolerance::Auto, 100).unwrap();
        assert_eq!(est.total, 3);
    }

    #[test]
    fn test_auto_rank_bounded_by_samples() {
        let cov = Matrix::identity(4, 4);
        let est = estimate_rank(&cov, &eeg(4), &RankMode::Auto, Tolerance::Auto, 3).unwrap();
        assert_eq!(est.total, 2);
    }

    #[test]
    fn test_per_kind_mismatch() {
        let cov = Matrix::identity(4, 4);
        let mut map = BTreeMap::new();
        map.insert(ChannelKind::Magnetometer, 2);
        let err = estimate_rank(&cov, &eeg(4), &RankMode::PerKind(map), Tolerance::Auto, 100)
            .unwrap_err();
        assert!(matches!(err, Error::RankMismatch { .. }));

        let mut map = BTreeMap::new();
        map.insert(ChannelKind::Electrode, 5);
        let mode = RankMode::PerKind(map);
        assert!(estimate_rank(&cov, &eeg(4), &mode, Tolerance::Auto, 100).is_err());

        let mut map = BTreeMap::new();
        map.insert(ChannelKind::Electrode, 3);
        let mode = RankMode::PerKind(map);
        let est = estimate_rank(&cov, &eeg(4), &mode, Tolerance::Auto, 100).unwrap();
        assert_eq!(est.total, 3);
    }

    #[test]
    fn test_full_subtracts_constraints() {
        let cov = Matrix::identity(4, 4);
        let sensors = eeg(4).with_constraints(1).unwrap();
        let est = estimate_rank(&cov, &sensors, &RankMode::Full, Tolerance::Auto, 100).unwrap();
        assert_eq!(est.total, 3);
        assert_eq!(est.by_kind[&ChannelKind::Electrode], 3);
    }
}
