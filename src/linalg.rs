//! Dense linear-algebra helpers on top of nalgebra.
//!
//! Everything here returns new allocations; inputs are never modified.

use nalgebra::SymmetricEigen;

use crate::constants::SINGULAR_TOL;
use crate::error::{Error, Result};
use crate::types::{Matrix, Vector};

/// Symmetric eigendecomposition with eigenvalues sorted in descending order.
///
/// Returns `(eigenvalues, eigenvectors)` where column `i` of the second
/// matrix belongs to eigenvalue `i`.
pub fn eigh_desc(matrix: &Matrix) -> (Vector, Matrix) {
    let n = matrix.nrows();
    let eig = SymmetricEigen::new(symmetrize(matrix));
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));

    let values = Vector::from_iterator(n, order.iter().map(|&i| eig.eigenvalues[i]));
    let mut vectors = Matrix::zeros(n, n);
    for (dst, &src) in order.iter().enumerate() {
        vectors.set_column(dst, &eig.eigenvectors.column(src));
    }
    (values, vectors)
}

/// `(A + Aᵀ) / 2`.
pub fn symmetrize(matrix: &Matrix) -> Matrix {
    (matrix + matrix.transpose()) * 0.5
}

/// Largest absolute asymmetry relative to the largest absolute entry.
pub fn relative_asymmetry(matrix: &Matrix) -> f64 {
    let scale = matrix.amax();
    if scale == 0.0 {
        return 0.0;
    }
    (matrix - matrix.transpose()).amax() / scale
}

/// `D · A · D` for a diagonal `D` given by `scale`.
pub fn scale_symmetric(matrix: &Matrix, scale: &[f64]) -> Matrix {
    Matrix::from_fn(matrix.nrows(), matrix.ncols(), |i, j| {
        matrix[(i, j)] * scale[i] * scale[j]
    })
}

/// Regularized pseudo-inverse restricted to the top-`rank` eigenspace.
///
/// Retained eigenvalues are loaded with `reg × mean(retained eigenvalues)`
/// before inversion; directions outside the rank map to zero.
pub fn reg_pinv(matrix: &Matrix, reg: f64, rank: usize) -> Result<(Matrix, f64)> {
    let n = matrix.nrows();
    if rank == 0 || rank > n {
        return Err(Error::invalid(
            "rank",
            format!("rank {rank} outside 1..={n}"),
        ));
    }
    let (values, vectors) = eigh_desc(matrix);
    let mean_retained = values.rows(0, rank).sum() / rank as f64;
    let loading = reg * mean_retained;

    let mut inv_values = Vector::zeros(n);
    for i in 0..rank {
        let v = values[i] + loading;
        if v <= SINGULAR_TOL * values[0].abs().max(f64::MIN_POSITIVE) {
            return Err(Error::SingularSystem {
                context: "regularized pseudo-inverse",
                location: None,
            });
        }
        inv_values[i] = 1.0 / v;
    }
    let inv = &vectors * Matrix::from_diagonal(&inv_values) * vectors.transpose();
    Ok((inv, loading))
}

/// Inverse of a small symmetric positive-definite matrix, or `None` when its
/// condition exceeds `1 / SINGULAR_TOL`.
pub fn spd_inverse(matrix: &Matrix) -> Option<Matrix> {
    let (values, vectors) = eigh_desc(matrix);
    let max = values[0];
    let min = values[values.len() - 1];
    if !(max > 0.0) || min <= SINGULAR_TOL * max {
        return None;
    }
    let inv_values = values.map(|v| 1.0 / v);
    Some(&vectors * Matrix::from_diagonal(&inv_values) * vectors.transpose())
}

/// Unit vector `v / ‖v‖`, or `None` for a zero vector.
pub fn normalized(v: &Vector) -> Option<Vector> {
    let norm = v.norm();
    (norm > 0.0).then(|| v / norm)
}
