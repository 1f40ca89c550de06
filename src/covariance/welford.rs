//! Online covariance accumulator using Welford's algorithm.
//!
//! Accumulates the channel covariance of multichannel windows in a single
//! pass without concatenating them. Two accumulators merge exactly with
//! Chan's parallel update, so windows can be folded on separate threads.

use crate::types::{Matrix, Vector};

/// Mean and sum of outer products over channel vectors.
#[derive(Debug, Clone)]
pub struct WelfordCovariance {
    /// Count of sample vectors accumulated so far.
    n: usize,
    /// Running mean.
    mean: Vector,
    /// Sum of outer products: Σ(x - μ)(x - μ)^T
    m2: Matrix,
}

impl WelfordCovariance {
    /// Create an empty accumulator over `n_channels`.
    pub fn new(n_channels: usize) -> Self {
        Self {
            n: 0,
            mean: Vector::zeros(n_channels),
            m2: Matrix::zeros(n_channels, n_channels),
        }
    }

    /// Update with one sample vector.
    ///
    /// ```text
    /// δ = x - μₙ₋₁
    /// μₙ = μₙ₋₁ + δ/n
    /// M2ₙ = M2ₙ₋₁ + δ·(x - μₙ)^T
    /// ```
    pub fn update(&mut self, x: &Vector) {
        self.n += 1;
        let n = self.n as f64;
        let delta = x - &self.mean;
        self.mean += &delta / n;
        let delta2 = x - &self.mean;
        self.m2 += delta * delta2.transpose();
    }

    /// Update with every column of a channels × time window.
    ///
    /// The window's own mean and scatter are computed in one batch and then
    /// merged, which is cheaper than one rank-1 update per column.
    pub fn update_window(&mut self, window: &Matrix) {
        let n = window.ncols();
        if n == 0 {
            return;
        }
        let mean = window.column_mean();
        let mut centered = window.clone();
        for mut col in centered.column_iter_mut() {
            col -= &mean;
        }
        let batch = Self {
            n,
            m2: &centered * centered.transpose(),
            mean,
        };
        self.merge(&batch);
    }

    /// Merge another accumulator into this one using Chan's parallel algorithm.
    ///
    /// ```text
    /// n_AB = n_A + n_B
    /// δ = μ_B - μ_A
    /// μ_AB = (n_A·μ_A + n_B·μ_B) / n_AB
    /// M2_AB = M2_A + M2_B + (n_A·n_B/n_AB)·δ·δ^T
    /// ```
    pub fn merge(&mut self, other: &Self) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = other.clone();
            return;
        }

        let n_a = self.n as f64;
        let n_b = other.n as f64;
        let n_ab = n_a + n_b;

        let delta = &other.mean - &self.mean;
        self.mean = (&self.mean * n_a + &other.mean * n_b) / n_ab;
        let correction = &delta * delta.transpose() * (n_a * n_b / n_ab);
        self.m2 = &self.m2 + &other.m2 + correction;

        self.n += other.n;
    }

    /// Unbiased covariance `M2 / (n - 1)`, or `None` for fewer than two samples.
    pub fn finalize(&self) -> Option<Matrix> {
        if self.n < 2 {
            return None;
        }
        Some(&self.m2 / (self.n - 1) as f64)
    }

    /// Number of sample vectors accumulated.
    pub fn count(&self) -> usize {
        self.n
    }

    /// Running mean.
    pub fn mean(&self) -> &Vector {
        &self.mean
    }
}
