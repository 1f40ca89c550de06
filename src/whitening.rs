//! Noise whitening restricted to the noise covariance rank.
//!
//! The whitener maps sensor data to a space where the noise covariance is
//! the identity on its top-`rank` eigenspace. Discarded directions map to
//! zero and are never inverted.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::covariance::CovarianceMatrix;
use crate::error::{Error, Result};
use crate::forward::ForwardOperator;
use crate::linalg::{eigh_desc, scale_symmetric};
use crate::sensor::{ensure_names_match, SensorSpace};
use crate::types::{Matrix, Vector};

/// Rank-restricted noise whitener, `channels × channels`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Whitener {
    matrix: Matrix,
    colorer: Matrix,
    eigenvalues: Vector,
    rank: usize,
    channel_names: Vec<String>,
}

impl Whitener {
    /// Build from a noise covariance over `sensors`.
    ///
    /// `rank` defaults to the covariance's own estimated rank. Channels are
    /// scaled by their unit scale before the eigendecomposition so that
    /// sensor kinds with very different magnitudes share one spectrum.
    pub fn build(
        noise_cov: &CovarianceMatrix,
        sensors: &SensorSpace,
        rank: Option<usize>,
    ) -> Result<Self> {
        noise_cov.check_compatible(sensors)?;
        let n = sensors.len();
        let rank = rank.unwrap_or_else(|| noise_cov.rank());
        if rank == 0 || rank > n {
            return Err(Error::RankMismatch {
                reason: format!("whitener rank {rank} outside 1..={n}"),
            });
        }

        let scale = sensors.scalings();
        let scaled = scale_symmetric(noise_cov.data(), &scale);
        let (values, vectors) = eigh_desc(&scaled);
        if values[rank - 1] <= 0.0 {
            return Err(Error::SingularSystem {
                context: "noise whitener",
                location: None,
            });
        }

        let mut matrix = Matrix::zeros(n, n);
        let mut colorer = Matrix::zeros(n, n);
        for k in 0..rank {
            let v = vectors.column(k);
            let root = values[k].sqrt();
            for ch in 0..n {
                matrix[(k, ch)] = v[ch] * scale[ch] / root;
                colorer[(ch, k)] = v[ch] / scale[ch] * root;
            }
        }
        debug!(
            rank,
            n_channels = n,
            condition = values[0] / values[rank - 1],
            "noise whitener built"
        );
        Ok(Self {
            matrix,
            colorer,
            eigenvalues: values.rows(0, rank).into_owned(),
            rank,
            channel_names: sensors.names(),
        })
    }

    /// The whitening matrix; rows beyond `rank` are zero.
    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    /// Number of retained noise directions.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Retained eigenvalues of the scaled noise covariance, descending.
    pub fn eigenvalues(&self) -> &Vector {
        &self.eigenvalues
    }

    /// Channel names in column order.
    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    /// Number of channels.
    pub fn n_channels(&self) -> usize {
        self.channel_names.len()
    }

    /// Whiten `channels × time` data.
    pub fn whiten_data(&self, data: &Matrix) -> Result<Matrix> {
        self.check_rows("whitener input", data)?;
        Ok(&self.matrix * data)
    }

    /// Whitened gain matrix of `forward`.
    pub fn whiten_forward(&self, forward: &ForwardOperator) -> Result<Matrix> {
        ensure_names_match("whitener forward", &self.channel_names, forward.channel_names())?;
        Ok(&self.matrix * forward.gain())
    }

    /// `W C Wᵀ` for a covariance on the same channels.
    pub fn whiten_covariance(&self, cov: &CovarianceMatrix) -> Result<Matrix> {
        ensure_names_match("whitener covariance", &self.channel_names, cov.channel_names())?;
        Ok(&self.matrix * cov.data() * self.matrix.transpose())
    }

    /// Map whitened data back to sensor space.
    pub fn color(&self, whitened: &Matrix) -> Result<Matrix> {
        self.check_rows("colorer input", whitened)?;
        Ok(&self.colorer * whitened)
    }

    /// Whitener for the average of `nave` independent trials.
    ///
    /// The noise covariance of an average shrinks by `1 / nave`.
    pub fn scaled_for_nave(&self, nave: f64) -> Result<Self> {
        if !(nave.is_finite() && nave >= 1.0) {
            return Err(Error::invalid("nave", format!("{nave} < 1")));
        }
        let root = nave.sqrt();
        Ok(Self {
            matrix: &self.matrix * root,
            colorer: &self.colorer / root,
            eigenvalues: &self.eigenvalues / nave,
            ..self.clone()
        })
    }

    /// Fail unless built on exactly the channels of `sensors`.
    pub fn check_compatible(&self, sensors: &SensorSpace) -> Result<()> {
        sensors.ensure_same_order("whitener channels", &self.channel_names)
    }

    fn check_rows(&self, context: &'static str, data: &Matrix) -> Result<()> {
        if data.nrows() != self.n_channels() {
            return Err(Error::shape(
                context,
                format!("{} rows", self.n_channels()),
                format!("{} rows", data.nrows()),
            ));
        }
        Ok(())
    }
}
