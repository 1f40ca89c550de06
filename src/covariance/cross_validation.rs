//! Held-out Gaussian log-likelihood for covariance model selection.
//!
//! Candidates are compared on the same rank subspace: the likelihood uses
//! the pseudo-determinant and pseudo-inverse over the top-`rank`
//! eigenvectors, so a rank-deficient estimate is scored on the directions
//! it actually models.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::constants::LOG_2PI;
use crate::linalg::eigh_desc;
use crate::types::{Matrix, Vector};

/// Split `n_windows` window indices into `folds` shuffled test folds.
///
/// Returns `(train, test)` index pairs. Fold sizes differ by at most one.
/// Zero folds yield no splits.
pub fn kfold_splits(n_windows: usize, folds: usize, seed: u64) -> Vec<(Vec<usize>, Vec<usize>)> {
    if folds == 0 {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..n_windows).collect();
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    order.shuffle(&mut rng);

    (0..folds)
        .map(|k| {
            let start = k * n_windows / folds;
            let end = (k + 1) * n_windows / folds;
            let mut test: Vec<usize> = order[start..end].to_vec();
            let mut train: Vec<usize> =
                order[..start].iter().chain(&order[end..]).copied().collect();
            test.sort_unstable();
            train.sort_unstable();
            (train, test)
        })
        .collect()
}

/// Mean per-sample log-likelihood of `samples` (channels × N, centered on
/// `mean`) under `N(mean, cov)` restricted to the top-`rank` eigenspace.
///
/// Returns `None` when a retained eigenvalue is not positive, when `rank`
/// exceeds the channel count, or when the shapes disagree.
pub fn gaussian_log_likelihood(
    cov: &Matrix,
    rank: usize,
    samples: &Matrix,
    mean: &Vector,
) -> Option<f64> {
    let channels = cov.nrows();
    let n = samples.ncols();
    if n == 0 || rank == 0 || rank > channels {
        return None;
    }
    if cov.ncols() != channels || samples.nrows() != channels || mean.len() != channels {
        return None;
    }
    let (values, vectors) = eigh_desc(cov);
    let basis = vectors.columns(0, rank);

    let mut centered = samples.clone();
    for mut col in centered.column_iter_mut() {
        col -= mean;
    }
    // Coordinates of the samples in the retained eigenbasis.
    let coords = basis.transpose() * centered;

    let mut log_det = 0.0;
    let mut mahal = 0.0;
    for i in 0..rank {
        let lambda = values[i];
        if !(lambda > 0.0) {
            return None;
        }
        log_det += lambda.ln();
        mahal += coords.row(i).norm_squared() / lambda;
    }

    Some(-0.5 * (rank as f64 * LOG_2PI + log_det + mahal / n as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kfold_partitions_everything() {
        let splits = kfold_splits(10, 3, 42);
        assert_eq!(splits.len(), 3);
        let mut seen: Vec<usize> = splits.iter().flat_map(|(_, test)| test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        for (train, test) in &splits {
            assert_eq!(train.len() + test.len(), 10);
            assert!(test.iter().all(|t| !train.contains(t)));
        }
    }

    #[test]
    fn test_kfold_zero_folds_is_empty() {
        assert!(kfold_splits(10, 0, 1).is_empty());
        let splits = kfold_splits(2, 3, 1);
        assert_eq!(splits.len(), 3);
        assert_eq!(splits.iter().map(|(_, test)| test.len()).sum::<usize>(), 2);
    }

    #[test]
    fn test_kfold_deterministic() {
        assert_eq!(kfold_splits(12, 4, 7), kfold_splits(12, 4, 7));
    }

    #[test]
    fn test_log_likelihood_at_mean() {
        let cov = Matrix::identity(3, 3);
        let samples = Matrix::zeros(3, 4);
        let ll = gaussian_log_likelihood(&cov, 3, &samples, &Vector::zeros(3)).unwrap();
        assert!((ll + 0.5 * 3.0 * LOG_2PI).abs() < 1e-12);
    }

    #[test]
    fn test_true_covariance_scores_higher() {
        // Samples spread with variance 4 along every axis.
        let samples = Matrix::from_row_slice(2, 4, &[2.0, -2.0, 2.0, -2.0, 2.0, 2.0, -2.0, -2.0]);
        let mean = Vector::zeros(2);
        let score = |variance: f64| {
            gaussian_log_likelihood(&(Matrix::identity(2, 2) * variance), 2, &samples, &mean)
        };
        let good = score(4.0).unwrap();
        let bad = score(0.1).unwrap();
        assert!(good > bad);
    }

    #[test]
    fn test_rank_deficient_rejected() {
        let cov = Matrix::from_diagonal(&Vector::from_vec(vec![1.0, 0.0]));
        let samples = Matrix::zeros(2, 3);
        assert!(gaussian_log_likelihood(&cov, 2, &samples, &Vector::zeros(2)).is_none());
        assert!(gaussian_log_likelihood(&cov, 1, &samples, &Vector::zeros(2)).is_some());
    }

    #[test]
    fn test_inconsistent_shapes_rejected() {
        let cov = Matrix::identity(2, 2);
        let samples = Matrix::zeros(2, 3);
        let mean = Vector::zeros(2);
        assert!(gaussian_log_likelihood(&cov, 3, &samples, &mean).is_none());
        assert!(gaussian_log_likelihood(&cov, 2, &Matrix::zeros(3, 3), &mean).is_none());
        assert!(gaussian_log_likelihood(&cov, 2, &samples, &Vector::zeros(3)).is_none());
        assert!(gaussian_log_likelihood(&cov, 2, &samples, &mean).is_some());
    }
}
