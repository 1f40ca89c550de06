//! Numerical defaults shared by the estimators and solvers.

/// Default number of cross-validation folds for covariance model selection.
pub const DEFAULT_CV_FOLDS: usize = 3;

/// Default per-kind diagonal loading factor for `DiagonalFixed` covariance.
pub const DEFAULT_DIAG_FACTOR: f64 = 0.1;

/// Default LCMV diagonal loading, as a fraction of the mean retained eigenvalue.
pub const DEFAULT_LCMV_REG: f64 = 0.05;

/// Default looseness of the orientation prior for minimum-norm solutions.
pub const DEFAULT_LOOSE: f64 = 0.2;

/// Default depth-weighting exponent.
pub const DEFAULT_DEPTH: f64 = 0.8;

/// Default upper bound on the ratio of depth weights (in amplitude).
pub const DEFAULT_DEPTH_LIMIT: f64 = 10.0;

/// Default signal-to-noise ratio for evoked data; lambda2 = 1 / SNR².
pub const DEFAULT_SNR: f64 = 3.0;

/// Relative tolerance used to reject non-symmetric covariance input.
pub const SYMMETRY_TOL: f64 = 1e-10;

/// Relative tolerance on negative eigenvalues of a supplied covariance.
pub const PSD_TOL: f64 = 1e-10;

/// Relative eigenvalue floor below which a per-location gain is singular.
pub const SINGULAR_TOL: f64 = 1e-12;

/// ln(2π), used in Gaussian log-likelihoods.
pub const LOG_2PI: f64 = 1.8378770664093453;
