//! Covariance estimation with model selection and explicit rank.
//!
//! Pipeline:
//! 1. Crop every window to the requested time range
//! 2. Scale channels by their unit scale so kinds share one order of magnitude
//! 3. Accumulate the empirical covariance window by window (Welford / Chan)
//! 4. Decide the rank with the configured [`RankMode`]
//! 5. Fit each candidate method inside the rank subspace
//! 6. With several candidates, keep the best held-out log-likelihood
//! 7. Undo the channel scaling

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::Config;
use crate::epochs::EpochSet;
use crate::error::{Error, Result};
use crate::linalg::{eigh_desc, scale_symmetric};
use crate::sensor::SensorSpace;
use crate::thread_pool;
use crate::types::Matrix;

use super::cross_validation::{gaussian_log_likelihood, kfold_splits};
use super::matrix::{CovarianceMatrix, CovarianceMethod};
use super::rank::{estimate_rank, RankEstimate, RankMode};
use super::shrinkage::{diagonal_loading, ledoit_wolf};
use super::welford::WelfordCovariance;

/// Estimates regularized channel covariances from multichannel windows.
///
/// # Example
///
/// ```ignore
/// use meg_inverse::covariance::{CovarianceEstimator, CovarianceMethod, RankMode};
///
/// let noise_cov = CovarianceEstimator::new().estimate(
///     &epochs,
///     (None, Some(0.0)),
///     &[CovarianceMethod::Empirical, CovarianceMethod::LedoitWolf],
///     &RankMode::Auto,
/// )?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct CovarianceEstimator {
    config: Config,
}

/// Windows of one training or evaluation split, already unit-scaled.
struct Split<'a> {
    windows: Vec<&'a Matrix>,
    acc: WelfordCovariance,
}

impl<'a> Split<'a> {
    fn new(windows: Vec<&'a Matrix>, n_channels: usize) -> Self {
        let acc = accumulate(&windows, n_channels);
        Self { windows, acc }
    }

    /// All samples side by side, centered on the split mean.
    fn centered_samples(&self) -> Matrix {
        let n_channels = self.acc.mean().len();
        let total: usize = self.windows.iter().map(|w| w.ncols()).sum();
        let mut out = Matrix::zeros(n_channels, total);
        let mut offset = 0;
        for w in &self.windows {
            out.columns_mut(offset, w.ncols()).copy_from(*w);
            offset += w.ncols();
        }
        for mut col in out.column_iter_mut() {
            col -= self.acc.mean();
        }
        out
    }
}

impl CovarianceEstimator {
    /// Create with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with an explicit configuration.
    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Estimate the covariance of `epochs` over `[tmin, tmax]`.
    ///
    /// With several `methods`, the one with the best cross-validated
    /// log-likelihood wins and is recorded in the result.
    pub fn estimate(
        &self,
        epochs: &EpochSet,
        time_range: (Option<f64>, Option<f64>),
        methods: &[CovarianceMethod],
        rank_mode: &RankMode,
    ) -> Result<CovarianceMatrix> {
        let windows = epochs
            .epochs()
            .iter()
            .map(|e| e.crop(time_range.0, time_range.1).map(|c| c.data))
            .collect::<Result<Vec<_>>>()?;
        self.estimate_windows(epochs.sensors(), &windows, methods, rank_mode)
    }

    /// Estimate from raw channels × time windows sharing `sensors`.
    pub fn estimate_windows(
        &self,
        sensors: &SensorSpace,
        windows: &[Matrix],
        methods: &[CovarianceMethod],
        rank_mode: &RankMode,
    ) -> Result<CovarianceMatrix> {
        if methods.is_empty() {
            return Err(Error::invalid("methods", "at least one candidate is required"));
        }
        if methods.contains(&CovarianceMethod::Supplied) {
            return Err(Error::invalid("methods", "`Supplied` is not an estimation method"));
        }
        if windows.is_empty() {
            return Err(Error::InsufficientData {
                what: "windows",
                got: 0,
                need: 1,
            });
        }
        let n_channels = sensors.len();
        for w in windows {
            if w.nrows() != n_channels {
                return Err(Error::shape(
                    "covariance window",
                    format!("{n_channels} rows"),
                    format!("{} rows", w.nrows()),
                ));
            }
        }

        let scalings = sensors.scalings();
        let scaled: Vec<Matrix> = windows.iter().map(|w| scale_rows(w, &scalings)).collect();

        let all = Split::new(scaled.iter().collect(), n_channels);
        let n_samples = all.acc.count();
        let empirical = all.acc.finalize().ok_or(Error::InsufficientData {
            what: "samples",
            got: n_samples,
            need: 2,
        })?;

        let rank = estimate_rank(
            &empirical,
            sensors,
            rank_mode,
            self.config.rank_tolerance,
            n_samples,
        )?;
        if rank.total == 0 {
            return Err(Error::SingularSystem {
                context: "covariance rank",
                location: None,
            });
        }

        let candidates = self.usable_candidates(methods, &rank, n_samples)?;

        let (winner, log_likelihood) = if candidates.len() == 1 {
            (candidates[0], None)
        } else {
            let (winner, score) =
                self.select_by_cross_validation(&candidates, &scaled, sensors, rank.total)?;
            (winner, Some(score))
        };

        let (fitted, regularization) = fit(winner, &all, &empirical, sensors, rank.total);
        let inv_scalings: Vec<f64> = scalings.iter().map(|s| 1.0 / s).collect();
        let data = scale_symmetric(&fitted, &inv_scalings);

        tracing::info!(
            method = winner.name(),
            rank = rank.total,
            n_channels,
            n_samples,
            regularization,
            "covariance estimated"
        );

        Ok(CovarianceMatrix::from_parts(
            data,
            sensors,
            winner,
            rank,
            regularization,
            n_samples,
            log_likelihood,
        ))
    }

    /// Drop the empirical candidate when the sample count cannot support the
    /// requested rank; fail when nothing else remains.
    fn usable_candidates(
        &self,
        methods: &[CovarianceMethod],
        rank: &RankEstimate,
        n_samples: usize,
    ) -> Result<Vec<CovarianceMethod>> {
        let need = rank.total + 1;
        if n_samples >= need {
            return Ok(methods.to_vec());
        }
        let remaining: Vec<CovarianceMethod> = methods
            .iter()
            .copied()
            .filter(|m| *m != CovarianceMethod::Empirical)
            .collect();
        if remaining.is_empty() {
            return Err(Error::InsufficientData {
                what: "samples",
                got: n_samples,
                need,
            });
        }
        tracing::warn!(
            n_samples,
            rank = rank.total,
            "too few samples for the empirical covariance; dropping it from the candidates"
        );
        Ok(remaining)
    }

    fn select_by_cross_validation(
        &self,
        candidates: &[CovarianceMethod],
        scaled: &[Matrix],
        sensors: &SensorSpace,
        rank: usize,
    ) -> Result<(CovarianceMethod, f64)> {
        let folds = self.config.cv_folds;
        if folds < 2 {
            return Err(Error::invalid("cv_folds", format!("{folds} < 2")));
        }
        if scaled.len() < folds {
            return Err(Error::InsufficientData {
                what: "windows for cross validation",
                got: scaled.len(),
                need: folds,
            });
        }
        let n_channels = sensors.len();
        let mut totals = vec![0.0; candidates.len()];

        for (train_idx, test_idx) in kfold_splits(scaled.len(), folds, self.config.seed) {
            let train = Split::new(train_idx.iter().map(|&i| &scaled[i]).collect(), n_channels);
            let test_windows: Vec<&Matrix> = test_idx.iter().map(|&i| &scaled[i]).collect();
            let test_samples = concat(&test_windows, n_channels);
            let Some(train_emp) = train.acc.finalize() else {
                return Err(Error::InsufficientData {
                    what: "training samples",
                    got: train.acc.count(),
                    need: 2,
                });
            };

            for (total, method) in totals.iter_mut().zip(candidates) {
                let (fitted, _) = fit(*method, &train, &train_emp, sensors, rank);
                let score = gaussian_log_likelihood(&fitted, rank, &test_samples, train.acc.mean())
                    .unwrap_or(f64::NEG_INFINITY);
                *total += score;
            }
        }

        let mut best: Option<(CovarianceMethod, f64)> = None;
        for (method, total) in candidates.iter().zip(&totals) {
            let mean = total / folds as f64;
            tracing::debug!(method = method.name(), log_likelihood = mean, "cross-validated score");
            if mean.is_finite() && best.map_or(true, |(_, b)| mean > b) {
                best = Some((*method, mean));
            }
        }
        best.ok_or(Error::SingularSystem {
            context: "covariance cross validation",
            location: None,
        })
    }
}

/// Fit one method on a split. Regularized methods act only inside the
/// top-`rank` eigenspace of the empirical covariance, so structural rank
/// deficiency is preserved.
fn fit(
    method: CovarianceMethod,
    split: &Split<'_>,
    empirical: &Matrix,
    sensors: &SensorSpace,
    rank: usize,
) -> (Matrix, Option<f64>) {
    match method {
        CovarianceMethod::Empirical | CovarianceMethod::Supplied => (empirical.clone(), None),
        CovarianceMethod::LedoitWolf => {
            let (_, vectors) = eigh_desc(empirical);
            let basis = vectors.columns(0, rank).into_owned();
            let projected = basis.transpose() * split.centered_samples();
            let (shrunk, alpha) = ledoit_wolf(&projected);
            tracing::debug!(shrinkage = alpha, rank, "ledoit-wolf shrinkage");
            (&basis * shrunk * basis.transpose(), Some(alpha))
        }
        CovarianceMethod::DiagonalFixed { .. } => {
            let groups: Vec<(Vec<usize>, f64)> = sensors
                .kinds_present()
                .into_iter()
                .map(|kind| (sensors.indices_of(kind), method.diag_factor(kind)))
                .collect();
            let loading = diagonal_loading(empirical, &groups) - empirical;
            let (_, vectors) = eigh_desc(empirical);
            let basis = vectors.columns(0, rank).into_owned();
            let projector = &basis * basis.transpose();
            let max_factor = groups.iter().map(|(_, f)| *f).fold(0.0, f64::max);
            (empirical + &projector * loading * &projector, Some(max_factor))
        }
    }
}

fn scale_rows(window: &Matrix, scalings: &[f64]) -> Matrix {
    Matrix::from_fn(window.nrows(), window.ncols(), |i, j| window[(i, j)] * scalings[i])
}

fn concat(windows: &[&Matrix], n_channels: usize) -> Matrix {
    let total: usize = windows.iter().map(|w| w.ncols()).sum();
    let mut out = Matrix::zeros(n_channels, total);
    let mut offset = 0;
    for w in windows {
        out.columns_mut(offset, w.ncols()).copy_from(*w);
        offset += w.ncols();
    }
    out
}

/// Fold windows into one accumulator, in parallel when enabled.
fn accumulate(windows: &[&Matrix], n_channels: usize) -> WelfordCovariance {
    #[cfg(feature = "parallel")]
    {
        thread_pool::install(|| {
            windows
                .par_iter()
                .fold(
                    || WelfordCovariance::new(n_channels),
                    |mut acc, w| {
                        acc.update_window(w);
                        acc
                    },
                )
                .reduce(
                    || WelfordCovariance::new(n_channels),
                    |mut a, b| {
                        a.merge(&b);
                        a
                    },
                )
        })
    }

    #[cfg(not(feature = "parallel"))]
    {
        thread_pool::install(|| {
            let mut acc = WelfordCovariance::new(n_channels);
            for w in windows {
                acc.update_window(w);
            }
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{Channel, ChannelKind};
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn sensors(n: usize) -> SensorSpace {
        SensorSpace::new(
            (0..n)
                .map(|i| Channel::new(format!("EEG{i:03}"), ChannelKind::Electrode).with_scale(1.0))
                .collect(),
        )
        .unwrap()
    }

    fn noise_windows(p: usize, n_windows: usize, n_times: usize, seed: u64) -> Vec<Matrix> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        (0..n_windows)
            .map(|_| Matrix::from_fn(p, n_times, |_, _| StandardNormal.sample(&mut rng)))
            .collect()
    }

    #[test]
    fn test_empirical_close_to_identity() {
        let windows = noise_windows(4, 50, 100, 1);
        let methods = [CovarianceMethod::Empirical];
        let cov = CovarianceEstimator::new()
            .estimate_windows(&sensors(4), &windows, &methods, &RankMode::Auto)
            .unwrap();
        assert_eq!(cov.rank(), 4);
        assert_eq!(cov.n_samples(), 5000);
        assert!((cov.data() - Matrix::identity(4, 4)).amax() < 0.1);
        assert!(cov.log_likelihood().is_none());
    }

    #[test]
    fn test_insufficient_samples_full_rank() {
        let windows = noise_windows(10, 1, 5, 2);
        let methods = [CovarianceMethod::Empirical];
        let err = CovarianceEstimator::new()
            .estimate_windows(&sensors(10), &windows, &methods, &RankMode::Full)
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientData { .. }));
    }

    #[test]
    fn test_auto_rank_corrects_sample_deficiency() {
        let windows = noise_windows(10, 1, 5, 2);
        let methods = [CovarianceMethod::Empirical];
        let cov = CovarianceEstimator::new()
            .estimate_windows(&sensors(10), &windows, &methods, &RankMode::Auto)
            .unwrap();
        assert_eq!(cov.rank(), 4);
    }

    #[test]
    fn test_cross_validation_records_winner() {
        let windows = noise_windows(6, 12, 20, 3);
        let cov = CovarianceEstimator::with_config(Config::quick())
            .estimate_windows(
                &sensors(6),
                &windows,
                &[CovarianceMethod::Empirical, CovarianceMethod::LedoitWolf],
                &RankMode::Auto,
            )
            .unwrap();
        assert!(matches!(
            cov.method(),
            CovarianceMethod::Empirical | CovarianceMethod::LedoitWolf
        ));
        assert!(cov.log_likelihood().unwrap().is_finite());
    }

    #[test]
    fn test_cross_validation_needs_windows() {
        let windows = noise_windows(3, 1, 50, 4);
        let err = CovarianceEstimator::new()
            .estimate_windows(
                &sensors(3),
                &windows,
                &[CovarianceMethod::Empirical, CovarianceMethod::LedoitWolf],
                &RankMode::Auto,
            )
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientData { .. }));
    }

    #[test]
    fn test_supplied_rejected() {
        let windows = noise_windows(3, 2, 50, 5);
        assert!(CovarianceEstimator::new()
            .estimate_windows(&sensors(3), &windows, &[CovarianceMethod::Supplied], &RankMode::Auto)
            .is_err());
        assert!(CovarianceEstimator::new()
            .estimate_windows(&sensors(3), &windows, &[], &RankMode::Auto)
            .is_err());
    }

    #[test]
    fn test_diagonal_fixed_loads_diagonal() {
        let windows = noise_windows(4, 20, 50, 6);
        let estimator = CovarianceEstimator::new();
        let fit = |method: CovarianceMethod| {
            estimator
                .estimate_windows(&sensors(4), &windows, &[method], &RankMode::Auto)
                .unwrap()
        };
        let emp = fit(CovarianceMethod::Empirical);
        let reg = fit(CovarianceMethod::diagonal_fixed());
        let mean_diag = emp.data().trace() / 4.0;
        for i in 0..4 {
            let added = reg.data()[(i, i)] - emp.data()[(i, i)];
            assert!((added - 0.1 * mean_diag).abs() < 1e-9, "added={added}");
        }
        assert_eq!(reg.regularization(), Some(0.1));
    }
}
