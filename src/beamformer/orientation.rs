//! Max-power orientation selection for free-orientation locations.

use nalgebra::Cholesky;

use crate::linalg::{eigh_desc, normalized};
use crate::types::{Matrix, Vec3, Vector};

/// Orientation maximizing unit-gain output power `1 / (oᵀ A o)`.
///
/// `a_inv` is `(Lᵀ C⁻¹ L)⁻¹`; the optimum is its leading eigenvector.
pub(crate) fn unit_gain(a_inv: &Matrix) -> Vector {
    let (_, vectors) = eigh_desc(a_inv);
    vectors.column(0).into_owned()
}

/// Orientation maximizing unit-noise-gain output power `oᵀ A o / oᵀ B o`.
///
/// Solves `A o = λ B o` through the Cholesky factor of `B = Lᵀ C⁻² L`.
/// Returns `None` when `B` is not positive definite.
pub(crate) fn unit_noise_gain(a: &Matrix, b: &Matrix) -> Option<Vector> {
    let chol = Cholesky::new(b.clone())?;
    let l_inv = chol.l().try_inverse()?;
    let reduced = &l_inv * a * l_inv.transpose();
    let (_, vectors) = eigh_desc(&reduced);
    normalized(&(l_inv.transpose() * vectors.column(0)))
}

/// Flip `o` so it does not point against `normal`.
pub(crate) fn align_with_normal(o: Vector, normal: &Vec3) -> Vector {
    let along = o[0] * normal.x + o[1] * normal.y + o[2] * normal.z;
    if along < 0.0 {
        -o
    } else {
        o
    }
}
