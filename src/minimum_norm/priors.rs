//! Source covariance priors: depth weighting and orientation looseness.

use tracing::warn;

use crate::error::{Error, Result};
use crate::forward::Orientation;
use crate::types::{Matrix, Vector};

/// Depth prior per location, `d_s^(-depth)`.
///
/// `d_s` is the squared Frobenius norm of location `s`'s whitened gain
/// columns, clamped below at `max(d) / limit²`.
pub(crate) fn depth_prior(
    whitened_gain: &Matrix,
    n_components: usize,
    depth: f64,
    limit: f64,
) -> Result<Vector> {
    let n_sources = whitened_gain.ncols() / n_components;
    if depth == 0.0 {
        return Ok(Vector::from_element(n_sources, 1.0));
    }
    let norms = Vector::from_fn(n_sources, |s, _| {
        whitened_gain.columns(s * n_components, n_components).norm_squared()
    });
    let max = norms.max();
    if !(max > 0.0) {
        return Err(Error::SingularSystem {
            context: "depth prior: every leadfield is whitened to zero",
            location: None,
        });
    }
    let low = max / (limit * limit);
    let clamped = norms.iter().filter(|&&d| d < low).count();
    if clamped > 0 {
        warn!(clamped, limit, "depth weighting saturated at limit");
    }
    Ok(norms.map(|d| d.max(low).powf(-depth)))
}

/// Prior variance per gain column.
///
/// Free orientations are surface oriented: the two tangential columns get
/// `loose` times the location's depth prior, the normal column gets it in full.
pub(crate) fn source_prior(depth: &Vector, orientation: Orientation, loose: f64) -> Vector {
    match orientation {
        Orientation::Fixed => depth.clone(),
        Orientation::Free => Vector::from_fn(depth.len() * 3, |i, _| {
            let d = depth[i / 3];
            if i % 3 == 2 {
                d
            } else {
                loose * d
            }
        }),
    }
}
