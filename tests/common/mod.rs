//! Synthetic sensors, sources and recordings shared by the integration tests.

#![allow(dead_code)]

use meg_inverse::{
    Channel, ChannelKind, CovarianceMatrix, Epoch, EpochSet, Evoked, ForwardOperator, Matrix,
    Orientation, RankMode, SensorSpace, SourceId, SourceLocation, SourceSpace, TimeAxis, Tolerance,
    Vec3,
};
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rand_xoshiro::Xoshiro256PlusPlus;

pub fn rng(seed: u64) -> Xoshiro256PlusPlus {
    Xoshiro256PlusPlus::seed_from_u64(seed)
}

pub fn gaussian(rng: &mut Xoshiro256PlusPlus, rows: usize, cols: usize) -> Matrix {
    Matrix::from_fn(rows, cols, |_, _| StandardNormal.sample(rng))
}

/// `n` unit-scale electrodes named `EEG000`, `EEG001`, ...
pub fn electrodes(n: usize) -> SensorSpace {
    SensorSpace::new(
        (0..n)
            .map(|i| Channel::new(format!("EEG{i:03}"), ChannelKind::Electrode).with_scale(1.0))
            .collect(),
    )
    .unwrap()
}

/// Source space with random normals, alternating hemispheres.
pub fn source_space(n: usize, rng: &mut Xoshiro256PlusPlus) -> SourceSpace {
    let locations = (0..n)
        .map(|i| {
            let id = if i % 2 == 0 { SourceId::left(i) } else { SourceId::right(i) };
            let normal = Vec3::new(
                StandardNormal.sample(rng),
                StandardNormal.sample(rng),
                StandardNormal.sample(rng),
            );
            SourceLocation::new(id, Vec3::new(0.0, 0.0, 0.07), normal).unwrap()
        })
        .collect();
    SourceSpace::new("synthetic", locations)
}

/// Forward operator with a random gain.
pub fn random_forward(
    sensors: &SensorSpace,
    n_sources: usize,
    orientation: Orientation,
    rng: &mut Xoshiro256PlusPlus,
) -> ForwardOperator {
    let sources = source_space(n_sources, rng);
    let gain = gaussian(rng, sensors.len(), n_sources * orientation.n_components());
    ForwardOperator::new(sensors, sources, gain, orientation).unwrap()
}

/// Supplied covariance with automatic rank.
pub fn supplied_cov(sensors: &SensorSpace, data: Matrix) -> CovarianceMatrix {
    CovarianceMatrix::from_matrix(sensors, data, &RankMode::Auto, Tolerance::Auto, 10_000).unwrap()
}

/// White-noise epochs, `n_times` samples each starting at `t0`.
pub fn noise_epochs(
    sensors: &SensorSpace,
    n_epochs: usize,
    n_times: usize,
    t0: f64,
    rng: &mut Xoshiro256PlusPlus,
) -> EpochSet {
    let times = TimeAxis::new(t0, 100.0, n_times).unwrap();
    let epochs = (0..n_epochs)
        .map(|_| Epoch::new("noise", gaussian(rng, sensors.len(), n_times), times).unwrap())
        .collect();
    EpochSet::new(sensors.clone(), epochs).unwrap()
}

/// Evoked response `gain_column × amplitude(t)` without noise.
pub fn evoked_from_column(
    sensors: &SensorSpace,
    column: &Matrix,
    amplitudes: &[f64],
    nave: f64,
) -> Evoked {
    let data = column * Matrix::from_row_slice(1, amplitudes.len(), amplitudes);
    let times = TimeAxis::new(0.0, 100.0, amplitudes.len()).unwrap();
    Evoked::new("planted", sensors, data, times, nave).unwrap()
}
