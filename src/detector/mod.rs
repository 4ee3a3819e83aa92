//! Isolation-based anomaly detector
//!
//! Anomalies are easier to isolate with random axis-aligned splits, so they
//! end up at shallower depth in randomly built partitioning trees. An
//! ensemble of such trees turns the average depth into a score in `(0, 1]`.

pub mod ensemble;
pub mod matrix;
pub mod tree;

pub use ensemble::{EnsembleConfig, IsolationEnsemble};
pub use matrix::FeatureMatrix;
pub use tree::PartitioningTree;

/// Euler–Mascheroni constant used by the harmonic number approximation
pub const EULER_GAMMA: f64 = 0.5772156649;

/// Approximate harmonic number `H(k) = ln(k) + γ`, with `H(0) = 0`
pub fn harmonic(k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    (k as f64).ln() + EULER_GAMMA
}

/// Average path length of an unsuccessful search in a binary tree of `n` points, `c(n)`.
///
/// Added at a leaf that still holds `n` points, and used as the score
/// normaliser at the ensemble's subsample size.
pub fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n_f = n as f64;
    2.0 * harmonic(n - 1) - 2.0 * (n_f - 1.0) / n_f
}
