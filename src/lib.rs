//! # meg-inverse
//!
//! Source localization for MEG/EEG: regularized covariance estimation, noise
//! whitening, LCMV beamforming and minimum-norm inverse solutions.
//!
//! The pipeline, from epochs to source estimates:
//! - Noise and data covariances estimated from epoch windows, with the
//!   regularization chosen by cross-validated likelihood
//! - A rank-aware noise whitener shared by both solver paths
//! - LCMV filter banks (unit gain or unit noise gain, max-power orientation)
//! - MNE / dSPM / sLORETA inverse operators with depth and orientation priors
//! - Source estimates with crop, combination and peak lookup
//!
//! ## Rank deficiency
//!
//! SSP projectors and average references remove dimensions from the data.
//! Every covariance carries its estimated rank and every inversion is
//! restricted to that rank; directions outside it are never inverted.
//!
//! ## Quick Start
//!
//! ```ignore
//! use meg_inverse::{
//!     make_inverse_operator, make_lcmv, CovarianceEstimator, CovarianceMethod,
//!     InverseMethod, InverseSettings, LcmvSettings, PickOri, RankMode,
//! };
//!
//! let estimator = CovarianceEstimator::new();
//! let methods = [CovarianceMethod::Empirical, CovarianceMethod::LedoitWolf];
//! let noise_cov = estimator.estimate(&epochs, (None, Some(0.0)), &methods, &RankMode::Auto)?;
//! let data_cov =
//!     estimator.estimate(&epochs, (Some(0.05), Some(0.25)), &methods, &RankMode::Auto)?;
//! let evoked = epochs.average("auditory/left")?;
//!
//! let filters = make_lcmv(&sensors, &forward, &data_cov, &noise_cov, None, &LcmvSettings::new())?;
//! let lcmv_stc = filters.apply(&evoked)?;
//!
//! let inverse = make_inverse_operator(&sensors, &forward, &noise_cov, &InverseSettings::new())?;
//! let lambda2 = meg_inverse::default_lambda2();
//! let dspm_stc = inverse.apply(&evoked, lambda2, InverseMethod::Dspm, PickOri::None)?;
//! println!("{}", meg_inverse::output::format_peak(&dspm_stc));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
mod config;
mod constants;
mod error;
mod linalg;
mod thread_pool;
mod types;

// Functional modules
pub mod beamformer;
pub mod covariance;
pub mod epochs;
pub mod forward;
pub mod minimum_norm;
pub mod output;
pub mod sensor;
pub mod source_estimate;
pub mod whitening;

// Re-exports for public API
pub use beamformer::{make_lcmv, LcmvFilter, LcmvSettings, WeightNorm};
pub use config::Config;
pub use constants::{
    DEFAULT_CV_FOLDS, DEFAULT_DEPTH, DEFAULT_DEPTH_LIMIT, DEFAULT_DIAG_FACTOR, DEFAULT_LCMV_REG,
    DEFAULT_LOOSE, DEFAULT_SNR, LOG_2PI,
};
pub use covariance::{
    CovarianceEstimator, CovarianceMatrix, CovarianceMethod, RankEstimate, RankMode, Tolerance,
};
pub use epochs::{Epoch, EpochSet, Evoked, TimeAxis};
pub use error::{Error, Result};
pub use forward::{Coordinates, ForwardOperator, Orientation, SourceLocation, SourceSpace};
pub use minimum_norm::{
    default_lambda2, lambda2_from_snr, make_inverse_operator, InverseMethod, InverseOperator,
    InverseSettings,
};
pub use sensor::{Channel, ChannelKind, SensorSpace};
pub use source_estimate::{Peak, SourceEstimate};
pub use types::{Hemisphere, Mat3, Matrix, PickOri, SourceId, Vec3, Vector};
pub use whitening::Whitener;
