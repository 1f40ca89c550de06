//! The assembled inverse operator and its application.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::epochs::{EpochSet, Evoked, TimeAxis};
use crate::error::{Error, Result};
use crate::forward::Orientation;
use crate::sensor::{ensure_names_match, SensorSpace};
use crate::source_estimate::SourceEstimate;
use crate::types::{Matrix, PickOri, SourceId, Vector};
use crate::whitening::Whitener;

use super::method::InverseMethod;

/// SVD of the whitened, prior-weighted gain plus everything needed to
/// assemble an inverse kernel for any `λ²`, `nave` and method.
///
/// Free-orientation operators are in surface-oriented coordinates: the last
/// of a location's three components is its surface normal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InverseOperator {
    pub(crate) eigen_fields: Matrix,
    pub(crate) sing: Vector,
    pub(crate) eigen_leads: Matrix,
    pub(crate) source_prior: Vector,
    pub(crate) whitener: Whitener,
    pub(crate) orientation: Orientation,
    pub(crate) loose: f64,
    pub(crate) depth: f64,
    pub(crate) locations: Vec<SourceId>,
    pub(crate) subject: String,
}

impl InverseOperator {
    /// Singular values of the whitened, prior-weighted gain, descending.
    pub fn singular_values(&self) -> &Vector {
        &self.sing
    }

    /// Prior variance per gain column, after scaling.
    pub fn source_prior(&self) -> &Vector {
        &self.source_prior
    }

    /// Single-trial noise whitener.
    pub fn whitener(&self) -> &Whitener {
        &self.whitener
    }

    /// Orientation of the solution space.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Orientation looseness the operator was built with.
    pub fn loose(&self) -> f64 {
        self.loose
    }

    /// Depth-weighting exponent the operator was built with.
    pub fn depth(&self) -> f64 {
        self.depth
    }

    /// Rank of the noise covariance used for whitening.
    pub fn noise_rank(&self) -> usize {
        self.whitener.rank()
    }

    /// Channel names in column order.
    pub fn channel_names(&self) -> &[String] {
        self.whitener.channel_names()
    }

    /// Location ids.
    pub fn locations(&self) -> &[SourceId] {
        &self.locations
    }

    /// Number of locations.
    pub fn n_sources(&self) -> usize {
        self.locations.len()
    }

    /// Fail unless built on exactly the channels of `sensors`.
    pub fn check_compatible(&self, sensors: &SensorSpace) -> Result<()> {
        self.whitener.check_compatible(sensors)
    }

    /// The linear map from sensor data to source activity.
    ///
    /// Rows follow the source estimate layout: three per location for
    /// free orientations (unless `pick_ori` is `Normal`), one otherwise.
    /// Noise-normalized methods divide every row of a location by the
    /// square root of that location's summed variance.
    pub fn kernel(
        &self,
        nave: f64,
        lambda2: f64,
        method: InverseMethod,
        pick_ori: PickOri,
    ) -> Result<Matrix> {
        if !(nave.is_finite() && nave >= 1.0) {
            return Err(Error::invalid("nave", format!("{nave} < 1")));
        }
        if !(lambda2.is_finite() && lambda2 >= 0.0) {
            return Err(Error::invalid("lambda2", format!("{lambda2} must be non-negative")));
        }
        let rows = self.kernel_rows(pick_ori)?;

        let reg: Vec<f64> = self.sing.iter().map(|&s| s / (s * s + lambda2)).collect();
        let weighted = Matrix::from_fn(rows.len(), self.sing.len(), |i, k| {
            self.source_prior[rows[i]].sqrt() * self.eigen_leads[(rows[i], k)] * reg[k]
        });
        let mut kernel = weighted * self.eigen_fields.transpose() * self.whitener.matrix();

        let per_location = if self.orientation == Orientation::Free && pick_ori != PickOri::Normal {
            3
        } else {
            1
        };
        for block in 0..rows.len() / per_location {
            let mut variance = None;
            for &row in &rows[block * per_location..(block + 1) * per_location] {
                let leads: Vec<f64> = self.eigen_leads.row(row).iter().copied().collect();
                let prior = self.source_prior[row];
                let sing = self.sing.as_slice();
                if let Some(v) = method.row_variance(&leads, sing, &reg, prior, nave) {
                    *variance.get_or_insert(0.0) += v;
                }
            }
            if let Some(v) = variance {
                if !(v > 0.0) {
                    return Err(Error::SingularSystem {
                        context: "noise normalization",
                        location: Some(block),
                    });
                }
                let mut rows_mut = kernel.rows_mut(block * per_location, per_location);
                rows_mut /= v.sqrt();
            }
        }
        debug!(
            method = method.name(),
            lambda2,
            nave,
            rows = kernel.nrows(),
            "inverse kernel assembled"
        );
        Ok(kernel)
    }

    /// Source estimate for an evoked response, using its `nave`.
    pub fn apply(
        &self,
        evoked: &Evoked,
        lambda2: f64,
        method: InverseMethod,
        pick_ori: PickOri,
    ) -> Result<SourceEstimate> {
        ensure_names_match("inverse apply", self.channel_names(), &evoked.channel_names)?;
        let kernel = self.kernel(evoked.nave, lambda2, method, pick_ori)?;
        self.estimate(&kernel, &evoked.data, evoked.times, pick_ori)
    }

    /// Source estimates for single epochs (`nave = 1`), in epoch order.
    pub fn apply_epochs(
        &self,
        epochs: &EpochSet,
        lambda2: f64,
        method: InverseMethod,
        pick_ori: PickOri,
    ) -> Result<Vec<SourceEstimate>> {
        ensure_names_match("inverse apply", self.channel_names(), &epochs.sensors().names())?;
        let kernel = self.kernel(1.0, lambda2, method, pick_ori)?;
        epochs
            .epochs()
            .iter()
            .map(|epoch| self.estimate(&kernel, &epoch.data, epoch.times, pick_ori))
            .collect()
    }

    fn estimate(
        &self,
        kernel: &Matrix,
        data: &Matrix,
        times: TimeAxis,
        pick_ori: PickOri,
    ) -> Result<SourceEstimate> {
        if data.nrows() != kernel.ncols() {
            return Err(Error::shape(
                "inverse apply",
                format!("{} rows", kernel.ncols()),
                format!("{} rows", data.nrows()),
            ));
        }
        let n_components = kernel.nrows() / self.n_sources();
        let stc = SourceEstimate::new(
            kernel * data,
            n_components,
            times,
            self.locations.clone(),
            self.subject.clone(),
        )?;
        if n_components == 3 && pick_ori == PickOri::None {
            Ok(stc.magnitude())
        } else {
            Ok(stc)
        }
    }

    fn kernel_rows(&self, pick_ori: PickOri) -> Result<Vec<usize>> {
        let n = self.n_sources();
        match (pick_ori, self.orientation) {
            (PickOri::MaxPower, _) => Err(Error::invalid(
                "pick_ori",
                "max-power orientation is only defined for the beamformer",
            )),
            (PickOri::Vector, Orientation::Fixed) => Err(Error::invalid(
                "pick_ori",
                "vector output needs a free-orientation operator",
            )),
            (PickOri::Normal, Orientation::Free) => Ok((0..n).map(|s| 3 * s + 2).collect()),
            (_, Orientation::Free) => Ok((0..3 * n).collect()),
            (_, Orientation::Fixed) => Ok((0..n).collect()),
        }
    }
}
