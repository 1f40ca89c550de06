//! Regularized covariance estimators.

use crate::types::Matrix;

/// Ledoit-Wolf shrinkage toward a scaled identity.
///
/// `x` is features × samples and must already be centered. Returns the
/// shrunk covariance `(1 - α)·S + α·μ·I` with `S = x·xᵀ / n`, `μ = tr(S)/p`
/// and the closed-form intensity `α ∈ [0, 1]`.
pub fn ledoit_wolf(x: &Matrix) -> (Matrix, f64) {
    let p = x.nrows();
    let n = x.ncols();
    if p == 0 || n == 0 {
        return (Matrix::zeros(p, p), 0.0);
    }
    let n_f = n as f64;
    let p_f = p as f64;

    let scatter = x * x.transpose();
    let emp_cov = &scatter / n_f;
    let trace = emp_cov.trace();
    let mu = trace / p_f;

    let x2 = x.component_mul(x);
    let beta_raw = (&x2 * x2.transpose()).sum();
    let delta_raw = scatter.component_mul(&scatter).sum() / (n_f * n_f);

    let beta = (beta_raw / n_f - delta_raw) / (p_f * n_f);
    let delta = (delta_raw - 2.0 * mu * trace + p_f * mu * mu) / p_f;
    let beta = beta.min(delta);

    let shrinkage = if delta > 0.0 {
        (beta / delta).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let mut shrunk = emp_cov * (1.0 - shrinkage);
    for i in 0..p {
        shrunk[(i, i)] += shrinkage * mu;
    }
    (shrunk, shrinkage)
}

/// Add `factors[i] × mean(diag over group i)` to the diagonal of each group.
///
/// `groups` lists channel indices per kind alongside that kind's factor.
pub fn diagonal_loading(cov: &Matrix, groups: &[(Vec<usize>, f64)]) -> Matrix {
    let mut loaded = cov.clone();
    for (idx, factor) in groups {
        if idx.is_empty() {
            continue;
        }
        let mean_diag = idx.iter().map(|&i| cov[(i, i)]).sum::<f64>() / idx.len() as f64;
        for &i in idx {
            loaded[(i, i)] += factor * mean_diag;
        }
    }
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn centered_noise(p: usize, n: usize, seed: u64) -> Matrix {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut x = Matrix::from_fn(p, n, |_, _| StandardNormal.sample(&mut rng));
        let mean = x.column_mean();
        for mut col in x.column_iter_mut() {
            col -= &mean;
        }
        x
    }

    #[test]
    fn test_shrinkage_in_unit_interval() {
        for (p, n) in [(5, 200), (20, 25), (30, 10)] {
            let x = centered_noise(p, n, 7);
            let (cov, alpha) = ledoit_wolf(&x);
            assert!((0.0..=1.0).contains(&alpha), "alpha={alpha}");
            assert!((&cov - cov.transpose()).amax() < 1e-12);
        }
    }

    #[test]
    fn test_shrinkage_grows_with_fewer_samples() {
        let (_, many) = ledoit_wolf(&centered_noise(20, 2000, 1));
        let (_, few) = ledoit_wolf(&centered_noise(20, 20, 1));
        assert!(few > many, "few={few} many={many}");
    }

    #[test]
    fn test_shrinkage_preserves_trace() {
        let x = centered_noise(8, 30, 3);
        let (cov, _) = ledoit_wolf(&x);
        let emp_trace = (&x * x.transpose()).trace() / 30.0;
        assert!((cov.trace() - emp_trace).abs() < 1e-9);
    }

    #[test]
    fn test_diagonal_loading_per_group() {
        let cov = Matrix::from_diagonal(&crate::types::Vector::from_vec(vec![1.0, 3.0, 10.0]));
        let loaded = diagonal_loading(&cov, &[(vec![0, 1], 0.1), (vec![2], 0.5)]);
        assert!((loaded[(0, 0)] - 1.2).abs() < 1e-12);
        assert!((loaded[(1, 1)] - 3.2).abs() < 1e-12);
        assert!((loaded[(2, 2)] - 15.0).abs() < 1e-12);
    }
}
