//! Saving and reloading covariances, filter banks and inverse operators.

mod common;

use meg_inverse::output::{load_json, save_json};
use meg_inverse::{
    make_inverse_operator, make_lcmv, CovarianceEstimator, CovarianceMatrix, CovarianceMethod,
    Error, Evoked, InverseMethod, InverseOperator, InverseSettings, LcmvFilter, LcmvSettings,
    Orientation, PickOri, RankMode, TimeAxis,
};
use tempfile::TempDir;

use common::{electrodes, gaussian, noise_epochs, random_forward, rng};

fn close(a: &meg_inverse::Matrix, b: &meg_inverse::Matrix) -> bool {
    (a - b).amax() <= 1e-12 * a.amax().max(1.0)
}

#[test]
fn reloaded_artifacts_apply_identically() {
    let dir = TempDir::new().unwrap();
    let sensors = electrodes(12);
    let mut r = rng(1);
    let forward = random_forward(&sensors, 6, Orientation::Free, &mut r);
    let epochs = noise_epochs(&sensors, 30, 40, -0.2, &mut r);

    let estimator = CovarianceEstimator::new();
    let noise = estimator
        .estimate(&epochs, (None, Some(0.0)), &[CovarianceMethod::LedoitWolf], &RankMode::Auto)
        .unwrap();
    let data = estimator
        .estimate(&epochs, (None, None), &[CovarianceMethod::Empirical], &RankMode::Auto)
        .unwrap();

    let cov_path = dir.path().join("noise-cov.json");
    save_json(&cov_path, &noise).unwrap();
    let loaded_cov: CovarianceMatrix = load_json(&cov_path).unwrap();
    assert_eq!(loaded_cov.rank(), noise.rank());
    assert_eq!(loaded_cov.method(), CovarianceMethod::LedoitWolf);
    assert!(close(noise.data(), loaded_cov.data()));
    loaded_cov.check_compatible(&sensors).unwrap();

    let evoked = Evoked::new(
        "x",
        &sensors,
        gaussian(&mut r, 12, 10),
        TimeAxis::new(0.0, 100.0, 10).unwrap(),
        30.0,
    )
    .unwrap();

    let bank = make_lcmv(&sensors, &forward, &data, &noise, None, &LcmvSettings::new()).unwrap();
    let bank_path = dir.path().join("lcmv.json");
    save_json(&bank_path, &bank).unwrap();
    let loaded_bank: LcmvFilter = load_json(&bank_path).unwrap();
    loaded_bank.check_compatible(&sensors).unwrap();
    assert_eq!(loaded_bank.settings(), bank.settings());
    assert!(close(
        bank.apply(&evoked).unwrap().data(),
        loaded_bank.apply(&evoked).unwrap().data()
    ));

    let inverse =
        make_inverse_operator(&sensors, &forward, &noise, &InverseSettings::new()).unwrap();
    let inv_path = dir.path().join("inverse.json");
    save_json(&inv_path, &inverse).unwrap();
    let loaded_inv: InverseOperator = load_json(&inv_path).unwrap();
    loaded_inv.check_compatible(&sensors).unwrap();
    let lambda2 = meg_inverse::default_lambda2();
    for method in [InverseMethod::Mne, InverseMethod::Dspm, InverseMethod::SLoreta] {
        let before = inverse.apply(&evoked, lambda2, method, PickOri::Vector).unwrap();
        let after = loaded_inv.apply(&evoked, lambda2, method, PickOri::Vector).unwrap();
        assert!(close(before.data(), after.data()), "{}", method.name());
    }
}

#[test]
fn reloaded_artifacts_reject_other_sensors() {
    let dir = TempDir::new().unwrap();
    let sensors = electrodes(6);
    let mut r = rng(2);
    let forward = random_forward(&sensors, 3, Orientation::Fixed, &mut r);
    let noise = common::supplied_cov(&sensors, meg_inverse::Matrix::identity(6, 6));
    let settings = InverseSettings::new().loose(0.0);
    let inverse = make_inverse_operator(&sensors, &forward, &noise, &settings).unwrap();
    let path = dir.path().join("inverse.json");
    save_json(&path, &inverse).unwrap();
    let loaded: InverseOperator = load_json(&path).unwrap();

    let fewer = sensors.pick(&["EEG000", "EEG001", "EEG002", "EEG003", "EEG004"]).unwrap();
    assert!(matches!(loaded.check_compatible(&fewer), Err(Error::ShapeMismatch { .. })));
    assert!(loaded.check_compatible(&electrodes(7)).is_err());
}

#[test]
fn missing_or_malformed_files_are_reported() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.json");
    assert!(matches!(
        load_json::<CovarianceMatrix>(&missing),
        Err(Error::Io { .. })
    ));

    let garbage = dir.path().join("garbage.json");
    std::fs::write(&garbage, "{\"not\": \"a covariance\"}").unwrap();
    assert!(matches!(
        load_json::<CovarianceMatrix>(&garbage),
        Err(Error::Serialization(_))
    ));
}
