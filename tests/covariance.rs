//! Covariance estimation end to end: symmetry, rank tracking and model selection.

mod common;

use std::collections::BTreeMap;

use meg_inverse::covariance::gaussian_log_likelihood;
use meg_inverse::{
    Channel, ChannelKind, Config, CovarianceEstimator, CovarianceMethod, Epoch, EpochSet, Error,
    Matrix, RankMode, SensorSpace, TimeAxis, Vector, Whitener,
};

use common::{electrodes, gaussian, noise_epochs, rng};

/// Projector removing three random directions, as SSP does.
fn three_projectors(n: usize, seed: u64) -> Matrix {
    let mut r = rng(seed);
    let q = gaussian(&mut r, n, 3).qr().q();
    Matrix::identity(n, n) - &q * q.transpose()
}

fn projected_epochs(sensors: &SensorSpace, proj: &Matrix, n_epochs: usize, seed: u64) -> EpochSet {
    let mut r = rng(seed);
    let times = TimeAxis::new(-0.2, 100.0, 40).unwrap();
    let epochs = (0..n_epochs)
        .map(|_| Epoch::new("noise", proj * gaussian(&mut r, sensors.len(), 40), times).unwrap())
        .collect();
    EpochSet::new(sensors.clone(), epochs).unwrap()
}

#[test]
fn estimate_is_symmetric_psd() {
    let sensors = electrodes(8);
    let epochs = noise_epochs(&sensors, 20, 50, -0.2, &mut rng(1));
    let cov = CovarianceEstimator::new()
        .estimate(&epochs, (None, Some(0.0)), &[CovarianceMethod::Empirical], &RankMode::Auto)
        .unwrap();
    assert_eq!(cov.data(), &cov.data().transpose());
    assert!(cov.is_positive_semidefinite(1e-12));
    // 21 samples per epoch fall inside [-0.2, 0.0].
    assert_eq!(cov.n_samples(), 20 * 21);
}

#[test]
fn three_constraints_leave_rank_n_minus_3() {
    let n = 12;
    let sensors = electrodes(n).with_constraints(3).unwrap();
    let proj = three_projectors(n, 7);
    let epochs = projected_epochs(&sensors, &proj, 30, 8);

    for method in [
        CovarianceMethod::Empirical,
        CovarianceMethod::LedoitWolf,
        CovarianceMethod::diagonal_fixed(),
    ] {
        let cov = CovarianceEstimator::new()
            .estimate(&epochs, (None, None), &[method], &RankMode::Auto)
            .unwrap();
        assert_eq!(cov.rank(), n - 3, "{}", method.name());

        // Regularization stays inside the rank subspace.
        let values = cov.eigenvalues();
        assert!(values[n - 3].abs() < 1e-10 * values[0], "{}", method.name());
    }
}

#[test]
fn whitener_annihilates_projected_directions() {
    let n = 10;
    let sensors = electrodes(n).with_constraints(3).unwrap();
    let proj = three_projectors(n, 11);
    let epochs = projected_epochs(&sensors, &proj, 40, 12);
    let cov = CovarianceEstimator::new()
        .estimate(&epochs, (None, None), &[CovarianceMethod::Empirical], &RankMode::Auto)
        .unwrap();
    let whitener = Whitener::build(&cov, &sensors, None).unwrap();
    assert_eq!(whitener.rank(), n - 3);

    let removed = Matrix::identity(n, n) - &proj;
    let whitened = whitener.whiten_data(&removed).unwrap();
    assert!(whitened.amax() < 1e-6);

    let kept = &proj * gaussian(&mut rng(13), n, 5);
    let round_trip = whitener.color(&whitener.whiten_data(&kept).unwrap()).unwrap();
    assert!((round_trip - &kept).amax() < 1e-9 * kept.amax());
}

#[test]
fn ledoit_wolf_generalizes_better_with_few_samples() {
    let p = 20;
    let sensors = electrodes(p);
    let mut r = rng(21);
    let train: Vec<Matrix> = (0..5).map(|_| gaussian(&mut r, p, 5)).collect();
    let held_out = gaussian(&mut r, p, 2000);
    let zero = Vector::zeros(p);

    let estimator = CovarianceEstimator::new();
    let emp = estimator
        .estimate_windows(&sensors, &train, &[CovarianceMethod::Empirical], &RankMode::Full)
        .unwrap();
    let lw = estimator
        .estimate_windows(&sensors, &train, &[CovarianceMethod::LedoitWolf], &RankMode::Full)
        .unwrap();

    let alpha = lw.regularization().unwrap();
    assert!((0.0..=1.0).contains(&alpha));
    let ll_emp = gaussian_log_likelihood(emp.data(), p, &held_out, &zero).unwrap();
    let ll_lw = gaussian_log_likelihood(lw.data(), p, &held_out, &zero).unwrap();
    assert!(ll_lw > ll_emp, "ledoit-wolf {ll_lw} vs empirical {ll_emp}");
}

#[test]
fn cross_validation_prefers_shrinkage_when_undersampled() {
    let p = 20;
    let sensors = electrodes(p);
    let mut r = rng(31);
    let windows: Vec<Matrix> = (0..6).map(|_| gaussian(&mut r, p, 6)).collect();
    let cov = CovarianceEstimator::with_config(Config::quick())
        .estimate_windows(
            &sensors,
            &windows,
            &[CovarianceMethod::Empirical, CovarianceMethod::LedoitWolf],
            &RankMode::Auto,
        )
        .unwrap();
    assert_eq!(cov.method(), CovarianceMethod::LedoitWolf);
    assert!(cov.log_likelihood().is_some());
}

#[test]
fn rank_map_must_match_present_kinds() {
    let sensors = electrodes(4);
    let epochs = noise_epochs(&sensors, 5, 30, 0.0, &mut rng(41));
    let estimator = CovarianceEstimator::new();
    let empirical = [CovarianceMethod::Empirical];

    let mut absent = BTreeMap::new();
    absent.insert(ChannelKind::Electrode, 4);
    absent.insert(ChannelKind::Magnetometer, 2);
    let err = estimator
        .estimate(&epochs, (None, None), &empirical, &RankMode::PerKind(absent))
        .unwrap_err();
    assert!(matches!(err, Error::RankMismatch { .. }));

    let mut too_large = BTreeMap::new();
    too_large.insert(ChannelKind::Electrode, 5);
    assert!(matches!(
        estimator.estimate(&epochs, (None, None), &empirical, &RankMode::PerKind(too_large)),
        Err(Error::RankMismatch { .. })
    ));

    let mut explicit = BTreeMap::new();
    explicit.insert(ChannelKind::Electrode, 3);
    let cov = estimator
        .estimate(&epochs, (None, None), &empirical, &RankMode::PerKind(explicit))
        .unwrap();
    assert_eq!(cov.rank(), 3);
}

#[test]
fn mixed_kinds_are_ranked_per_kind() {
    let sensors = SensorSpace::new(vec![
        Channel::new("MEG0111", ChannelKind::Gradiometer),
        Channel::new("MEG0112", ChannelKind::Gradiometer),
        Channel::new("MEG0113", ChannelKind::Magnetometer),
        Channel::new("MEG0121", ChannelKind::Magnetometer),
    ])
    .unwrap();
    let mut r = rng(51);
    // Physical units: gradiometers ~1e-11 T/m, magnetometers ~1e-13 T.
    let scale = Matrix::from_diagonal(&Vector::from_vec(vec![1e-11, 1e-11, 1e-13, 1e-13]));
    let windows: Vec<Matrix> = (0..10).map(|_| &scale * gaussian(&mut r, 4, 50)).collect();
    let cov = CovarianceEstimator::new()
        .estimate_windows(&sensors, &windows, &[CovarianceMethod::LedoitWolf], &RankMode::Auto)
        .unwrap();
    assert_eq!(cov.rank(), 4);
    assert_eq!(cov.rank_by_kind()[&ChannelKind::Gradiometer], 2);
    assert_eq!(cov.rank_by_kind()[&ChannelKind::Magnetometer], 2);
    assert!(cov.data()[(0, 0)] > 1e-23 && cov.data()[(0, 0)] < 1e-21);
}

#[test]
fn time_range_outside_epochs_is_rejected() {
    let sensors = electrodes(3);
    let epochs = noise_epochs(&sensors, 4, 20, 0.0, &mut rng(61));
    let err = CovarianceEstimator::new()
        .estimate(&epochs, (Some(5.0), Some(6.0)), &[CovarianceMethod::Empirical], &RankMode::Auto)
        .unwrap_err();
    assert!(matches!(err, Error::TimeRange { .. }));
}
