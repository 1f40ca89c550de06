//! Minimum-norm inverse solutions (MNE, dSPM, sLORETA).
//!
//! One SVD of the whitened, prior-weighted gain is computed when the operator
//! is built. Regularization and the noise normalization of the chosen method
//! are applied when a kernel is assembled, so a single operator serves every
//! `λ²` and method.

mod method;
mod operator;
mod priors;
mod settings;

pub use method::{default_lambda2, lambda2_from_snr, InverseMethod};
pub use operator::InverseOperator;
pub use settings::InverseSettings;

use nalgebra::SVD;
use tracing::{debug, info};

use crate::covariance::{rank_from_spectrum, CovarianceMatrix, Tolerance};
use crate::error::{Error, Result};
use crate::forward::{ForwardOperator, Orientation};
use crate::sensor::SensorSpace;
use crate::types::{Matrix, Vector};
use crate::whitening::Whitener;

/// Build an inverse operator from a forward operator and a noise covariance.
///
/// A fixed-orientation forward requires `loose = 0`. A free forward with
/// `loose = 0` is projected on the surface normals; otherwise it is rotated
/// to surface-oriented coordinates and given the loose orientation prior.
pub fn make_inverse_operator(
    sensors: &SensorSpace,
    forward: &ForwardOperator,
    noise_cov: &CovarianceMatrix,
    settings: &InverseSettings,
) -> Result<InverseOperator> {
    settings.validate()?;
    forward.check_compatible(sensors)?;

    let whitener = Whitener::build(noise_cov, sensors, settings.rank)?;

    // Depth weights come from the full leadfield of each location, before any
    // orientation reduction.
    let depth = priors::depth_prior(
        &whitener.whiten_forward(forward)?,
        forward.n_components(),
        settings.depth,
        settings.depth_limit,
    )?;

    let forward = match (forward.orientation(), settings.loose) {
        (Orientation::Fixed, loose) if loose > 0.0 => {
            return Err(Error::invalid(
                "loose",
                format!("{loose} needs a free-orientation forward; use 0 for a fixed one"),
            ))
        }
        (Orientation::Fixed, _) => forward.clone(),
        (Orientation::Free, loose) if loose == 0.0 => forward.to_fixed(),
        (Orientation::Free, _) => forward.to_surface_oriented()?,
    };
    let mut prior = priors::source_prior(&depth, forward.orientation(), settings.loose);

    let mut gain = whitener.whiten_forward(&forward)?;
    for (mut column, p) in gain.column_iter_mut().zip(prior.iter()) {
        column *= p.sqrt();
    }
    let trace = gain.norm_squared();
    if !(trace > 0.0) {
        return Err(Error::SingularSystem {
            context: "whitened gain",
            location: None,
        });
    }
    let scale = whitener.rank() as f64 / trace;
    gain *= scale.sqrt();
    prior *= scale;
    debug!(scale, rank = whitener.rank(), "source prior scaled");

    let (eigen_fields, sing, eigen_leads) = truncated_svd(gain, whitener.rank())?;
    debug!(
        n_components = sing.len(),
        s_max = sing[0],
        s_min = sing[sing.len() - 1],
        "whitened gain decomposed"
    );

    info!(
        n_sources = forward.n_sources(),
        orientation = ?forward.orientation(),
        loose = settings.loose,
        depth = settings.depth,
        noise_rank = whitener.rank(),
        "inverse operator built"
    );
    Ok(InverseOperator {
        eigen_fields,
        sing,
        eigen_leads,
        source_prior: prior,
        whitener,
        orientation: forward.orientation(),
        loose: settings.loose,
        depth: settings.depth,
        locations: forward.sources().ids(),
        subject: forward.sources().subject.clone(),
    })
}

/// Thin SVD `A = U diag(s) Vᵀ` keeping at most `max_rank` non-negligible
/// components, sorted by decreasing singular value. Returns `(U, s, V)`.
fn truncated_svd(a: Matrix, max_rank: usize) -> Result<(Matrix, Vector, Matrix)> {
    let singular = || Error::SingularSystem {
        context: "gain decomposition",
        location: None,
    };
    let svd = SVD::try_new(a, true, true, f64::EPSILON, 0).ok_or_else(singular)?;
    let u = svd.u.ok_or_else(singular)?;
    let v_t = svd.v_t.ok_or_else(singular)?;

    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));
    let sorted: Vec<f64> = order.iter().map(|&i| svd.singular_values[i]).collect();
    let keep = rank_from_spectrum(&sorted, Tolerance::Auto).min(max_rank);
    if keep == 0 {
        return Err(singular());
    }

    let order = &order[..keep];
    let fields = u.select_columns(order);
    let leads = v_t.select_rows(order).transpose();
    let sing = Vector::from_iterator(keep, sorted.into_iter().take(keep));
    Ok((fields, sing, leads))
}
