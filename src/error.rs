//! Error types for covariance estimation, inverse construction and application.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the inverse-solver pipeline.
///
/// Construction-time errors (covariance estimation, whitener, filter and
/// operator builds) fail the whole build. Apply-time errors fail a single
/// application and leave the filter bank or operator usable.
#[derive(Error, Debug)]
pub enum Error {
    /// Not enough samples or windows for the requested estimate.
    #[error("Insufficient data: got {got} {what}, need {need}")]
    InsufficientData {
        /// What was counted (samples, windows, ...)
        what: &'static str,
        /// Number supplied
        got: usize,
        /// Number required
        need: usize,
    },

    /// A supplied rank map disagrees with the sensor types present.
    #[error("Rank mismatch: {reason}")]
    RankMismatch {
        /// What disagrees
        reason: String,
    },

    /// Channel counts, orderings or matrix dimensions disagree.
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Where the mismatch was detected
        context: &'static str,
        /// Expected shape or channel
        expected: String,
        /// Actual shape or channel
        actual: String,
    },

    /// Inversion attempted outside a validated rank subspace.
    #[error("Singular system in {context}{}", at_location(.location))]
    SingularSystem {
        /// Which system could not be inverted
        context: &'static str,
        /// Source location index, when per-location
        location: Option<usize>,
    },

    /// Source estimates with different locations, components or time axes.
    #[error("Incompatible source estimates: {reason}")]
    IncompatibleEstimates {
        /// What differs
        reason: String,
    },

    /// A time selection does not overlap the time axis.
    #[error("Time range [{tmin}, {tmax}] s outside axis [{start}, {end}] s")]
    TimeRange {
        /// Requested start
        tmin: f64,
        /// Requested end
        tmax: f64,
        /// First sample time
        start: f64,
        /// Last sample time
        end: f64,
    },

    /// A parameter is out of range or incompatible with the inputs.
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Failed to read or write a persisted artifact.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Failed to encode or decode a persisted artifact.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Crate result alias.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn shape(
        context: &'static str,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Error::ShapeMismatch {
            context,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

fn at_location(location: &Option<usize>) -> String {
    location
        .map(|l| format!(" at source location {l}"))
        .unwrap_or_default()
}
