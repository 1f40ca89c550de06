//! Type aliases and common types.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Dense matrix (channels × time, channels × channels, channels × sources, ...).
pub type Matrix = DMatrix<f64>;

/// Dense column vector.
pub type Vector = DVector<f64>;

/// 3x3 matrix for per-location orientation problems.
pub type Mat3 = Matrix3<f64>;

/// 3-dimensional vector for positions, normals and dipole orientations.
pub type Vec3 = Vector3<f64>;

/// Cortical hemisphere a source location belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Hemisphere {
    /// Left hemisphere.
    Left,
    /// Right hemisphere.
    Right,
}

/// Identity of a source location: hemisphere plus surface vertex number.
///
/// Two estimates are comparable only if their location ids match in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId {
    /// Hemisphere.
    pub hemisphere: Hemisphere,
    /// Vertex number on the subject's surface.
    pub vertex: usize,
}

impl SourceId {
    /// Left-hemisphere vertex.
    pub fn left(vertex: usize) -> Self {
        Self {
            hemisphere: Hemisphere::Left,
            vertex,
        }
    }

    /// Right-hemisphere vertex.
    pub fn right(vertex: usize) -> Self {
        Self {
            hemisphere: Hemisphere::Right,
            vertex,
        }
    }
}

/// Orientation selection for filter and inverse output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PickOri {
    /// Scalar output per location; free orientations are combined by norm.
    #[default]
    None,
    /// Keep only the surface-normal component.
    Normal,
    /// Keep all three orientation components.
    Vector,
    /// Per-location orientation maximizing output power (beamformer only).
    MaxPower,
}
