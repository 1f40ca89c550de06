//! The covariance value type shared by the whitener and both solvers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_DIAG_FACTOR, PSD_TOL, SYMMETRY_TOL};
use crate::error::{Error, Result};
use crate::linalg::{eigh_desc, relative_asymmetry, scale_symmetric, symmetrize};
use crate::sensor::{ChannelKind, SensorSpace};
use crate::types::{Matrix, Vector};

use super::rank::{estimate_rank, RankEstimate, RankMode, Tolerance};

/// Covariance estimation method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CovarianceMethod {
    /// Sample covariance with `1/(N−1)` normalization.
    Empirical,
    /// Ledoit-Wolf shrinkage toward a scaled identity.
    LedoitWolf,
    /// Empirical plus a fixed fraction of each kind's mean variance on the diagonal.
    DiagonalFixed {
        /// Loading for magnetometers.
        mag: f64,
        /// Loading for gradiometers.
        grad: f64,
        /// Loading for electrodes.
        eeg: f64,
    },
    /// Matrix supplied by the caller; not an estimation candidate.
    Supplied,
}

impl CovarianceMethod {
    /// `DiagonalFixed` with the default loading for every kind.
    pub fn diagonal_fixed() -> Self {
        CovarianceMethod::DiagonalFixed {
            mag: DEFAULT_DIAG_FACTOR,
            grad: DEFAULT_DIAG_FACTOR,
            eeg: DEFAULT_DIAG_FACTOR,
        }
    }

    /// Short name used in logs and summaries.
    pub fn name(&self) -> &'static str {
        match self {
            CovarianceMethod::Empirical => "empirical",
            CovarianceMethod::LedoitWolf => "ledoit_wolf",
            CovarianceMethod::DiagonalFixed { .. } => "diagonal_fixed",
            CovarianceMethod::Supplied => "supplied",
        }
    }

    pub(crate) fn diag_factor(&self, kind: ChannelKind) -> f64 {
        match (self, kind) {
            (CovarianceMethod::DiagonalFixed { mag, .. }, ChannelKind::Magnetometer) => *mag,
            (CovarianceMethod::DiagonalFixed { grad, .. }, ChannelKind::Gradiometer) => *grad,
            (CovarianceMethod::DiagonalFixed { eeg, .. }, ChannelKind::Electrode) => *eeg,
            _ => 0.0,
        }
    }
}

/// Symmetric PSD channel covariance tagged with how it was obtained.
///
/// The estimated rank travels with the matrix: directions beyond it are
/// numerically or structurally empty and must not be inverted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovarianceMatrix {
    data: Matrix,
    channel_names: Vec<String>,
    method: CovarianceMethod,
    rank: RankEstimate,
    regularization: Option<f64>,
    n_samples: usize,
    n_constraints: usize,
    log_likelihood: Option<f64>,
}

impl CovarianceMatrix {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        data: Matrix,
        sensors: &SensorSpace,
        method: CovarianceMethod,
        rank: RankEstimate,
        regularization: Option<f64>,
        n_samples: usize,
        log_likelihood: Option<f64>,
    ) -> Self {
        Self {
            data: symmetrize(&data),
            channel_names: sensors.names(),
            method,
            rank,
            regularization,
            n_samples,
            n_constraints: sensors.n_constraints(),
            log_likelihood,
        }
    }

    /// Wrap an externally computed covariance.
    ///
    /// The matrix must be square over `sensors`, symmetric and positive
    /// semidefinite up to rounding; its rank is determined with
    /// `rank_mode` exactly as for estimated matrices.
    pub fn from_matrix(
        sensors: &SensorSpace,
        data: Matrix,
        rank_mode: &RankMode,
        tol: Tolerance,
        n_samples: usize,
    ) -> Result<Self> {
        let n = sensors.len();
        if data.nrows() != n || data.ncols() != n {
            return Err(Error::shape(
                "covariance",
                format!("{n}x{n}"),
                format!("{}x{}", data.nrows(), data.ncols()),
            ));
        }
        if relative_asymmetry(&data) > SYMMETRY_TOL {
            return Err(Error::invalid("covariance", "matrix is not symmetric"));
        }
        let values = eigh_desc(&data).0;
        if let Some(min) = negative_eigenvalue(&values, PSD_TOL) {
            return Err(Error::invalid(
                "covariance",
                format!("matrix is indefinite (eigenvalue {min:e})"),
            ));
        }
        let scaled = scale_symmetric(&data, &sensors.scalings());
        let rank = estimate_rank(&scaled, sensors, rank_mode, tol, n_samples)?;
        Ok(Self::from_parts(
            data,
            sensors,
            CovarianceMethod::Supplied,
            rank,
            None,
            n_samples,
            None,
        ))
    }

    /// Covariance values, channels × channels.
    pub fn data(&self) -> &Matrix {
        &self.data
    }

    /// Channel names in row order.
    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    /// Method that produced this estimate (the cross-validation winner).
    pub fn method(&self) -> CovarianceMethod {
        self.method
    }

    /// Total rank used downstream.
    pub fn rank(&self) -> usize {
        self.rank.total
    }

    /// Rank per channel kind.
    pub fn rank_by_kind(&self) -> &BTreeMap<ChannelKind, usize> {
        &self.rank.by_kind
    }

    /// Shrinkage intensity or diagonal loading, when regularized.
    pub fn regularization(&self) -> Option<f64> {
        self.regularization
    }

    /// Number of time samples the estimate is based on.
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Known linear constraints of the sensor space it was estimated on.
    pub fn n_constraints(&self) -> usize {
        self.n_constraints
    }

    /// Mean held-out log-likelihood, when chosen by cross validation.
    pub fn log_likelihood(&self) -> Option<f64> {
        self.log_likelihood
    }

    /// Number of channels.
    pub fn n_channels(&self) -> usize {
        self.channel_names.len()
    }

    /// Eigenvalues in descending order.
    pub fn eigenvalues(&self) -> Vector {
        eigh_desc(&self.data).0
    }

    /// True when symmetric and no eigenvalue is below `-tol · λ_max`.
    pub fn is_positive_semidefinite(&self, tol: f64) -> bool {
        if relative_asymmetry(&self.data) > SYMMETRY_TOL {
            return false;
        }
        negative_eigenvalue(&self.eigenvalues(), tol).is_none()
    }

    /// New covariance with every entry multiplied by `factor`.
    ///
    /// Used to derive the noise covariance of an average of `nave` trials
    /// (`factor = 1 / nave`).
    pub fn scaled(&self, factor: f64) -> Result<Self> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(Error::invalid("factor", format!("{factor} must be positive")));
        }
        Ok(Self {
            data: &self.data * factor,
            ..self.clone()
        })
    }

    /// Restrict to the channels of `sensors`, in its order.
    ///
    /// The rank is re-estimated on the subset and never exceeds the
    /// original rank.
    pub fn pick(&self, sensors: &SensorSpace) -> Result<Self> {
        let idx = sensors
            .names()
            .iter()
            .map(|name| {
                self.channel_names
                    .iter()
                    .position(|c| c == name)
                    .ok_or_else(|| Error::shape("covariance pick", "a covariance channel", name))
            })
            .collect::<Result<Vec<_>>>()?;
        let data = self.data.select_rows(&idx).select_columns(&idx);
        let scaled = scale_symmetric(&data, &sensors.scalings());
        let mut rank =
            estimate_rank(&scaled, sensors, &RankMode::Auto, Tolerance::Auto, usize::MAX)?;
        rank.total = rank.total.min(self.rank.total);
        Ok(Self {
            data,
            channel_names: sensors.names(),
            rank,
            n_constraints: sensors.n_constraints(),
            ..self.clone()
        })
    }

    /// Fail unless this covariance is indexed exactly like `sensors`.
    pub fn check_compatible(&self, sensors: &SensorSpace) -> Result<()> {
        sensors.ensure_same_order("covariance channels", &self.channel_names)
    }
}

/// Smallest eigenvalue when it lies below `-tol · λ_max`.
fn negative_eigenvalue(values: &Vector, tol: f64) -> Option<f64> {
    let max = values.max().max(0.0);
    let min = values.min();
    (min < -tol * max).then_some(min)
}
