//! The LCMV filter bank and its application.

use serde::{Deserialize, Serialize};

use crate::covariance::CovarianceMatrix;
use crate::epochs::{EpochSet, Evoked, TimeAxis};
use crate::error::{Error, Result};
use crate::sensor::{ensure_names_match, SensorSpace};
use crate::source_estimate::SourceEstimate;
use crate::types::{Matrix, PickOri, SourceId, Vec3};

use super::settings::LcmvSettings;

/// Spatial filters for every source location, expressed in sensor space.
///
/// Row block `s` (one or three rows) belongs to location `s`. The noise
/// whitener is folded into the rows, so applying the bank is one product
/// with raw sensor data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LcmvFilter {
    pub(crate) filters: Matrix,
    pub(crate) rows_per_location: usize,
    pub(crate) orientations: Option<Vec<Vec3>>,
    pub(crate) settings: LcmvSettings,
    pub(crate) channel_names: Vec<String>,
    pub(crate) locations: Vec<SourceId>,
    pub(crate) subject: String,
    pub(crate) noise_rank: usize,
    pub(crate) loading: f64,
}

impl LcmvFilter {
    /// Filter rows, `(locations · rows per location) × channels`.
    pub fn filters(&self) -> &Matrix {
        &self.filters
    }

    /// Rows per location (3 for vector filters, else 1).
    pub fn rows_per_location(&self) -> usize {
        self.rows_per_location
    }

    /// Chosen orientation per location, in head coordinates, for
    /// `PickOri::MaxPower`.
    pub fn orientations(&self) -> Option<&[Vec3]> {
        self.orientations.as_deref()
    }

    /// Settings the bank was built with.
    pub fn settings(&self) -> &LcmvSettings {
        &self.settings
    }

    /// Channel names in column order.
    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    /// Location ids in row-block order.
    pub fn locations(&self) -> &[SourceId] {
        &self.locations
    }

    /// Number of locations.
    pub fn n_sources(&self) -> usize {
        self.locations.len()
    }

    /// Rank of the noise whitener the bank was built with.
    pub fn noise_rank(&self) -> usize {
        self.noise_rank
    }

    /// Absolute diagonal loading added to the whitened data covariance.
    pub fn loading(&self) -> f64 {
        self.loading
    }

    /// Fail unless the bank was built on exactly the channels of `sensors`.
    pub fn check_compatible(&self, sensors: &SensorSpace) -> Result<()> {
        sensors.ensure_same_order("lcmv filter channels", &self.channel_names)
    }

    /// Source time courses for an evoked response.
    pub fn apply(&self, evoked: &Evoked) -> Result<SourceEstimate> {
        ensure_names_match("lcmv apply", &self.channel_names, &evoked.channel_names)?;
        self.apply_data(&evoked.data, evoked.times)
    }

    /// Source time courses for every epoch of a set, in epoch order.
    pub fn apply_epochs(&self, epochs: &EpochSet) -> Result<Vec<SourceEstimate>> {
        ensure_names_match("lcmv apply", &self.channel_names, &epochs.sensors().names())?;
        epochs
            .epochs()
            .iter()
            .map(|epoch| self.apply_data(&epoch.data, epoch.times))
            .collect()
    }

    /// Source power for a data covariance, as a single-sample estimate.
    ///
    /// Vector filters report the power summed over their three rows.
    pub fn apply_cov(&self, cov: &CovarianceMatrix) -> Result<SourceEstimate> {
        ensure_names_match("lcmv apply_cov", &self.channel_names, cov.channel_names())?;
        let projected = &self.filters * cov.data();
        let k = self.rows_per_location;
        let power = Matrix::from_fn(self.n_sources(), 1, |s, _| {
            (s * k..(s + 1) * k)
                .map(|r| projected.row(r).dot(&self.filters.row(r)))
                .sum()
        });
        SourceEstimate::new(
            power,
            1,
            TimeAxis::new(0.0, 1.0, 1)?,
            self.locations.clone(),
            self.subject.clone(),
        )
    }

    fn apply_data(&self, data: &Matrix, times: TimeAxis) -> Result<SourceEstimate> {
        if data.nrows() != self.filters.ncols() {
            return Err(Error::shape(
                "lcmv apply",
                format!("{} rows", self.filters.ncols()),
                format!("{} rows", data.nrows()),
            ));
        }
        let sources = &self.filters * data;
        let stc = SourceEstimate::new(
            sources,
            self.rows_per_location,
            times,
            self.locations.clone(),
            self.subject.clone(),
        )?;
        if self.rows_per_location == 3 && self.settings.pick_ori == PickOri::None {
            Ok(stc.magnitude())
        } else {
            Ok(stc)
        }
    }
}
