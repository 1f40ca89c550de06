//! Forward operator: source amplitudes to sensor measurements.
//!
//! A forward operator is immutable once built. Orientation conversions and
//! channel restriction return new operators.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sensor::SensorSpace;
use crate::types::{Mat3, Matrix, SourceId, Vec3};

/// Number of dipole components modeled per location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    /// Three orthogonal components per location.
    Free,
    /// One component per location, along the surface normal.
    Fixed,
}

impl Orientation {
    /// Columns per location.
    pub fn n_components(self) -> usize {
        match self {
            Orientation::Free => 3,
            Orientation::Fixed => 1,
        }
    }
}

/// Coordinate frame of free-orientation columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coordinates {
    /// Columns along the head-frame x, y, z axes.
    Cartesian,
    /// Columns along two surface tangents and the surface normal (last).
    SurfaceOriented,
}

/// One source location on the cortical surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Hemisphere and vertex.
    pub id: SourceId,
    /// Position in head coordinates (m).
    pub position: Vec3,
    /// Outward unit surface normal.
    pub normal: Vec3,
}

impl SourceLocation {
    /// Create a location; the normal is normalized and must be non-zero.
    pub fn new(id: SourceId, position: Vec3, normal: Vec3) -> Result<Self> {
        let norm = normal.norm();
        if !(norm.is_finite() && norm > 0.0) {
            return Err(Error::invalid("normal", format!("zero normal at vertex {}", id.vertex)));
        }
        Ok(Self {
            id,
            position,
            normal: normal / norm,
        })
    }

    /// Orthonormal frame `[t1 t2 n]` with the surface normal as last column.
    pub fn surface_frame(&self) -> Mat3 {
        let n = self.normal;
        let seed = if n.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
        let t1 = (seed - n * seed.dot(&n)).normalize();
        let t2 = n.cross(&t1);
        Mat3::from_columns(&[t1, t2, n])
    }
}

/// Source locations of one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpace {
    /// Subject identifier passed through to rendering.
    pub subject: String,
    /// Locations in column order.
    pub locations: Vec<SourceLocation>,
}

impl SourceSpace {
    /// Create a source space.
    pub fn new(subject: impl Into<String>, locations: Vec<SourceLocation>) -> Self {
        Self {
            subject: subject.into(),
            locations,
        }
    }

    /// Number of locations.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// True when there are no locations.
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Location ids in order.
    pub fn ids(&self) -> Vec<SourceId> {
        self.locations.iter().map(|l| l.id).collect()
    }
}

/// Gain matrix `channels × (locations · components)` with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardOperator {
    gain: Matrix,
    orientation: Orientation,
    coordinates: Coordinates,
    sources: SourceSpace,
    channel_names: Vec<String>,
}

impl ForwardOperator {
    /// Build a forward operator over `sensors` and `sources`.
    ///
    /// Free-orientation gains are taken to be Cartesian; fixed gains are
    /// taken to be along each location's normal.
    pub fn new(
        sensors: &SensorSpace,
        sources: SourceSpace,
        gain: Matrix,
        orientation: Orientation,
    ) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::InsufficientData {
                what: "source locations",
                got: 0,
                need: 1,
            });
        }
        let expected_cols = sources.len() * orientation.n_components();
        if gain.nrows() != sensors.len() || gain.ncols() != expected_cols {
            return Err(Error::shape(
                "forward gain",
                format!("{}x{}", sensors.len(), expected_cols),
                format!("{}x{}", gain.nrows(), gain.ncols()),
            ));
        }
        if gain.iter().any(|v| !v.is_finite()) {
            return Err(Error::invalid("gain", "non-finite entries"));
        }
        let coordinates = match orientation {
            Orientation::Free => Coordinates::Cartesian,
            Orientation::Fixed => Coordinates::SurfaceOriented,
        };
        Ok(Self {
            gain,
            orientation,
            coordinates,
            sources,
            channel_names: sensors.names(),
        })
    }

    /// Gain matrix.
    pub fn gain(&self) -> &Matrix {
        &self.gain
    }

    /// Orientation mode.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Coordinate frame of the columns.
    pub fn coordinates(&self) -> Coordinates {
        self.coordinates
    }

    /// Source locations.
    pub fn sources(&self) -> &SourceSpace {
        &self.sources
    }

    /// Channel names in row order.
    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    /// Number of channels.
    pub fn n_channels(&self) -> usize {
        self.gain.nrows()
    }

    /// Number of source locations.
    pub fn n_sources(&self) -> usize {
        self.sources.len()
    }

    /// Columns per location.
    pub fn n_components(&self) -> usize {
        self.orientation.n_components()
    }

    /// Gain columns of one location (`channels × components`).
    pub fn location_gain(&self, location: usize) -> Matrix {
        let k = self.n_components();
        self.gain.columns(location * k, k).into_owned()
    }

    /// Surface normal expressed in the frame of this operator's columns.
    pub fn normal_in_frame(&self, location: usize) -> Vec3 {
        match self.coordinates {
            Coordinates::Cartesian => self.sources.locations[location].normal,
            Coordinates::SurfaceOriented => Vec3::z(),
        }
    }

    /// New fixed-orientation operator projecting each location on its normal.
    pub fn to_fixed(&self) -> Self {
        if self.orientation == Orientation::Fixed {
            return self.clone();
        }
        let n_ch = self.n_channels();
        let mut gain = Matrix::zeros(n_ch, self.n_sources());
        for s in 0..self.n_sources() {
            let block = self.gain.columns(s * 3, 3);
            let normal = self.normal_in_frame(s);
            gain.set_column(s, &(block * normal));
        }
        Self {
            gain,
            orientation: Orientation::Fixed,
            coordinates: Coordinates::SurfaceOriented,
            sources: self.sources.clone(),
            channel_names: self.channel_names.clone(),
        }
    }

    /// New free-orientation operator in surface-oriented coordinates.
    pub fn to_surface_oriented(&self) -> Result<Self> {
        match (self.orientation, self.coordinates) {
            (Orientation::Fixed, _) => Err(Error::invalid(
                "orientation",
                "a fixed-orientation forward has no tangential components",
            )),
            (Orientation::Free, Coordinates::SurfaceOriented) => Ok(self.clone()),
            (Orientation::Free, Coordinates::Cartesian) => {
                let mut gain = self.gain.clone();
                for (s, loc) in self.sources.locations.iter().enumerate() {
                    let frame = loc.surface_frame();
                    let rotated = self.gain.columns(s * 3, 3) * frame;
                    gain.columns_mut(s * 3, 3).copy_from(&rotated);
                }
                Ok(Self {
                    gain,
                    coordinates: Coordinates::SurfaceOriented,
                    ..self.clone()
                })
            }
        }
    }

    /// New operator restricted to `sensors`' channels, in its order.
    pub fn pick_channels(&self, sensors: &SensorSpace) -> Result<Self> {
        let idx = sensors
            .names()
            .iter()
            .map(|name| {
                self.channel_names
                    .iter()
                    .position(|c| c == name)
                    .ok_or_else(|| Error::shape("forward channel pick", "a forward channel", name))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            gain: self.gain.select_rows(&idx),
            channel_names: sensors.names(),
            ..self.clone()
        })
    }

    /// Fail unless the rows are indexed exactly like `sensors`.
    pub fn check_compatible(&self, sensors: &SensorSpace) -> Result<()> {
        sensors.ensure_same_order("forward channels", &self.channel_names)
    }
}
