//! Linearly constrained minimum variance (LCMV) beamformer.
//!
//! Every source location gets its own spatial filter passing activity from
//! that location with unit gain while minimizing total output power. The
//! computation happens in noise-whitened space; the resulting filters are
//! composed with the whitener and stored in sensor space.

mod filter;
mod orientation;
mod settings;

pub use filter::LcmvFilter;
pub use settings::{LcmvSettings, WeightNorm};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, info};

use crate::covariance::CovarianceMatrix;
use crate::error::{Error, Result};
use crate::forward::{Coordinates, ForwardOperator, Orientation};
use crate::linalg::{reg_pinv, spd_inverse};
use crate::sensor::SensorSpace;
use crate::thread_pool;
use crate::types::{Matrix, PickOri, Vec3};
use crate::whitening::Whitener;

/// Whitened-space filter rows of one location.
struct LocationFilter {
    rows: Matrix,
    orientation: Option<Vec3>,
}

/// Shared read-only inputs of the per-location solve.
struct Problem<'a> {
    gain: &'a Matrix,
    c_inv: &'a Matrix,
    c_inv_sq: &'a Matrix,
    components: usize,
    settings: &'a LcmvSettings,
}

/// Build an LCMV filter bank.
///
/// `rank` overrides the noise covariance rank used for whitening and for
/// the data covariance pseudo-inverse. Any location whose leadfield falls in
/// the discarded noise subspace fails the whole build with
/// [`Error::SingularSystem`].
pub fn make_lcmv(
    sensors: &SensorSpace,
    forward: &ForwardOperator,
    data_cov: &CovarianceMatrix,
    noise_cov: &CovarianceMatrix,
    rank: Option<usize>,
    settings: &LcmvSettings,
) -> Result<LcmvFilter> {
    settings.validate()?;
    forward.check_compatible(sensors)?;
    data_cov.check_compatible(sensors)?;

    let forward = match (settings.pick_ori, forward.orientation()) {
        (PickOri::Vector, Orientation::Fixed) => {
            return Err(Error::invalid(
                "pick_ori",
                "vector output needs a free-orientation forward",
            ))
        }
        (PickOri::Normal, Orientation::Free) => forward.to_surface_oriented()?,
        _ => forward.clone(),
    };

    let whitener = Whitener::build(noise_cov, sensors, rank)?;
    let gain = whitener.whiten_forward(&forward)?;
    let c_white = whitener.whiten_covariance(data_cov)?;
    let (c_inv, loading) = reg_pinv(&c_white, settings.reg, whitener.rank())?;
    let c_inv_sq = &c_inv * &c_inv;
    debug!(
        noise_rank = whitener.rank(),
        loading,
        n_sources = forward.n_sources(),
        "whitened data covariance inverted"
    );

    let problem = Problem {
        gain: &gain,
        c_inv: &c_inv,
        c_inv_sq: &c_inv_sq,
        components: forward.n_components(),
        settings,
    };
    let normals: Vec<Vec3> = (0..forward.n_sources()).map(|s| forward.normal_in_frame(s)).collect();
    let per_location = solve_all(&problem, &normals)?;

    let rows_per_location = per_location.first().map_or(1, |loc| loc.rows.nrows());
    let mut filters = Matrix::zeros(forward.n_sources() * rows_per_location, sensors.len());
    for (s, loc) in per_location.iter().enumerate() {
        let sensor_rows = &loc.rows * whitener.matrix();
        filters.rows_mut(s * rows_per_location, rows_per_location).copy_from(&sensor_rows);
    }

    let orientations = (settings.pick_ori == PickOri::MaxPower).then(|| {
        per_location
            .iter()
            .zip(&forward.sources().locations)
            .map(|(loc, source)| match (loc.orientation, forward.coordinates()) {
                (Some(o), Coordinates::Cartesian) => o,
                (Some(o), Coordinates::SurfaceOriented) => source.surface_frame() * o,
                (None, _) => source.normal,
            })
            .collect()
    });

    info!(
        n_sources = forward.n_sources(),
        rows_per_location,
        pick_ori = ?settings.pick_ori,
        weight_norm = ?settings.weight_norm,
        "lcmv filter bank built"
    );
    Ok(LcmvFilter {
        filters,
        rows_per_location,
        orientations,
        settings: *settings,
        channel_names: sensors.names(),
        locations: forward.sources().ids(),
        subject: forward.sources().subject.clone(),
        noise_rank: whitener.rank(),
        loading,
    })
}

/// Solve every location, preserving location order. Any failing location
/// aborts the build.
fn solve_all(problem: &Problem<'_>, normals: &[Vec3]) -> Result<Vec<LocationFilter>> {
    #[cfg(feature = "parallel")]
    {
        thread_pool::install(|| {
            normals
                .par_iter()
                .enumerate()
                .map(|(s, normal)| solve_location(problem, s, normal))
                .collect()
        })
    }
    #[cfg(not(feature = "parallel"))]
    {
        thread_pool::install(|| {
            normals
                .iter()
                .enumerate()
                .map(|(s, normal)| solve_location(problem, s, normal))
                .collect()
        })
    }
}

fn solve_location(problem: &Problem<'_>, s: usize, normal: &Vec3) -> Result<LocationFilter> {
    let k = problem.components;
    let singular = || Error::SingularSystem {
        context: "lcmv leadfield projection",
        location: Some(s),
    };

    let g = problem.gain.columns(s * k, k);
    let c_inv_g = problem.c_inv * g;
    let a = g.transpose() * &c_inv_g;
    let a_inv = spd_inverse(&a).ok_or_else(singular)?;

    let (mut rows, orientation) = match (problem.settings.pick_ori, k) {
        (PickOri::MaxPower, 3) => {
            let o = match problem.settings.weight_norm {
                WeightNorm::UnitGain => orientation::unit_gain(&a_inv),
                WeightNorm::UnitNoiseGain => {
                    let b = g.transpose() * problem.c_inv_sq * g;
                    orientation::unit_noise_gain(&a, &b).ok_or_else(singular)?
                }
            };
            let o = orientation::align_with_normal(o, normal);
            let c_inv_go = &c_inv_g * &o;
            let denom = (g * &o).dot(&c_inv_go);
            if !(denom > 0.0) {
                return Err(singular());
            }
            let row = Matrix::from_iterator(1, c_inv_go.len(), c_inv_go.iter().map(|v| v / denom));
            (row, Some(Vec3::new(o[0], o[1], o[2])))
        }
        _ => (&a_inv * c_inv_g.transpose(), None),
    };

    if problem.settings.weight_norm == WeightNorm::UnitNoiseGain {
        for mut row in rows.row_iter_mut() {
            let norm = row.norm();
            if norm > 0.0 {
                row /= norm;
            }
        }
    }

    if problem.settings.pick_ori == PickOri::Normal && k == 3 {
        rows = rows.rows(2, 1).into_owned();
    }
    Ok(LocationFilter { rows, orientation })
}
