//! Source time courses and the algebra used to compare them.

use serde::{Deserialize, Serialize};

use crate::epochs::TimeAxis;
use crate::error::{Error, Result};
use crate::types::{Matrix, SourceId};

/// Activity per source location over time.
///
/// Rows are source-major: location `s` owns rows
/// `s * n_components .. (s + 1) * n_components`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEstimate {
    data: Matrix,
    n_components: usize,
    times: TimeAxis,
    locations: Vec<SourceId>,
    subject: String,
}

/// Location and time of the largest absolute value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Location id.
    pub location: SourceId,
    /// Index of the location in the estimate.
    pub index: usize,
    /// Time in seconds.
    pub time: f64,
    /// Value at the peak (signed for scalar estimates, norm for vector ones).
    pub value: f64,
}

impl SourceEstimate {
    /// Wrap source activity; `data` must have `locations · n_components` rows.
    pub fn new(
        data: Matrix,
        n_components: usize,
        times: TimeAxis,
        locations: Vec<SourceId>,
        subject: impl Into<String>,
    ) -> Result<Self> {
        if n_components != 1 && n_components != 3 {
            return Err(Error::invalid("n_components", format!("{n_components} is not 1 or 3")));
        }
        let rows = locations.len() * n_components;
        if data.nrows() != rows || data.ncols() != times.n_times {
            return Err(Error::shape(
                "source estimate",
                format!("{rows}x{}", times.n_times),
                format!("{}x{}", data.nrows(), data.ncols()),
            ));
        }
        Ok(Self {
            data,
            n_components,
            times,
            locations,
            subject: subject.into(),
        })
    }

    /// Activity, `(locations · components) × time`.
    pub fn data(&self) -> &Matrix {
        &self.data
    }

    /// Time axis of the columns.
    pub fn times(&self) -> &TimeAxis {
        &self.times
    }

    /// Location ids in row order.
    pub fn locations(&self) -> &[SourceId] {
        &self.locations
    }

    /// Subject the locations belong to.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Rows per location: 1 (scalar) or 3 (vector).
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Number of locations.
    pub fn n_sources(&self) -> usize {
        self.locations.len()
    }

    /// True for three-component estimates.
    pub fn is_vector(&self) -> bool {
        self.n_components == 3
    }

    /// Copy restricted to `[tmin, tmax]`.
    pub fn crop(&self, tmin: Option<f64>, tmax: Option<f64>) -> Result<Self> {
        let (first, last) = self.times.index_range(tmin, tmax)?;
        Ok(Self {
            data: self.data.columns(first, last - first + 1).into_owned(),
            times: self.times.slice(first, last),
            ..self.clone()
        })
    }

    /// Weighted sum of estimates over identical locations and time axes.
    pub fn combine(terms: &[(&SourceEstimate, f64)]) -> Result<Self> {
        let (first, _) = terms.first().ok_or(Error::InsufficientData {
            what: "source estimates",
            got: 0,
            need: 1,
        })?;
        let mut data = Matrix::zeros(first.data.nrows(), first.data.ncols());
        for (stc, weight) in terms {
            first.ensure_comparable(stc)?;
            data += &stc.data * *weight;
        }
        Ok(Self {
            data,
            ..(*first).clone()
        })
    }

    /// Absolute value per location, or Euclidean norm over components.
    pub fn magnitude(&self) -> Self {
        let k = self.n_components;
        let data = Matrix::from_fn(self.n_sources(), self.times.n_times, |s, t| {
            if k == 1 {
                self.data[(s, t)].abs()
            } else {
                self.data.view((s * k, t), (k, 1)).norm()
            }
        });
        Self {
            data,
            n_components: 1,
            ..self.clone()
        }
    }

    /// `|a| − |b|`, for contrasting two conditions independent of polarity.
    pub fn difference_of_magnitudes(a: &SourceEstimate, b: &SourceEstimate) -> Result<Self> {
        a.ensure_comparable(b)?;
        let (ma, mb) = (a.magnitude(), b.magnitude());
        Ok(Self {
            data: ma.data - mb.data,
            ..ma
        })
    }

    /// Location and time of the largest absolute value.
    ///
    /// `None` for an estimate without samples.
    pub fn peak(&self) -> Option<Peak> {
        let scalar = if self.is_vector() { self.magnitude() } else { self.clone() };
        let n_rows = scalar.data.nrows();
        let (flat, &value) = scalar
            .data
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))?;
        // Column-major storage.
        let (row, col) = (flat % n_rows, flat / n_rows);
        Some(Peak {
            location: self.locations[row],
            index: row,
            time: self.times.time(col),
            value,
        })
    }

    /// Rows of one location, `components × time`.
    pub fn time_course(&self, location: SourceId) -> Result<Matrix> {
        let index = self
            .locations
            .iter()
            .position(|&id| id == location)
            .ok_or_else(|| Error::invalid("location", format!("{location:?} not in estimate")))?;
        Ok(self.data.rows(index * self.n_components, self.n_components).into_owned())
    }

    fn ensure_comparable(&self, other: &Self) -> Result<()> {
        let reason = if self.locations != other.locations {
            "location sets differ"
        } else if self.n_components != other.n_components {
            "component counts differ"
        } else if !self.times.matches(&other.times) {
            "time axes differ"
        } else {
            return Ok(());
        };
        Err(Error::IncompatibleEstimates {
            reason: reason.to_string(),
        })
    }
}
