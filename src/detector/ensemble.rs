//! Isolation ensemble
//!
//! A collection of independently built partitioning trees. The averaged path
//! length is normalised by `c(ψ)` into an anomaly score
//! `s(x) = 2^(−E[h(x)] / c(ψ))`: close to 1 for anomalies, around or below 0.5
//! for normal points.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::matrix::{ensure_finite, FeatureMatrix};
use super::tree::{max_depth_for, PartitioningTree};
use super::average_path_length;
use crate::error::{ModelError, ModelResult};

pub const DEFAULT_N_ESTIMATORS: usize = 200;
pub const DEFAULT_CONTAMINATION: f64 = 0.05;
pub const DEFAULT_SUBSAMPLE_SIZE: usize = 256;
pub const DEFAULT_RANDOM_SEED: u64 = 42;

/// Ensemble build parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Number of trees
    pub n_estimators: usize,
    /// Expected anomaly fraction in the training data, in (0, 0.5]
    pub contamination: f64,
    /// Subsample size cap ψ per tree
    pub subsample_size: usize,
    /// Master seed for the per-tree seed sequence
    pub seed: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            n_estimators: DEFAULT_N_ESTIMATORS,
            contamination: DEFAULT_CONTAMINATION,
            subsample_size: DEFAULT_SUBSAMPLE_SIZE,
            seed: DEFAULT_RANDOM_SEED,
        }
    }
}

impl EnsembleConfig {
    pub fn validate(&self) -> ModelResult<()> {
        if self.n_estimators < 1 {
            return Err(ModelError::configuration("n_estimators must be at least 1"));
        }
        if self.subsample_size < 1 {
            return Err(ModelError::configuration("subsample_size must be at least 1"));
        }
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(ModelError::configuration(format!(
                "contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        Ok(())
    }
}

/// Trained isolation ensemble with its calibrated decision threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationEnsemble {
    trees: Vec<PartitioningTree>,
    /// Subsample size actually used, `min(config.subsample_size, rows)`
    subsample_size: usize,
    n_features: usize,
    /// `(1 − contamination)`-quantile of training scores
    threshold: f64,
}

impl IsolationEnsemble {
    /// Build `n_estimators` trees on subsamples drawn without replacement and
    /// calibrate the threshold against the training matrix itself.
    pub fn build(matrix: &FeatureMatrix, config: &EnsembleConfig) -> ModelResult<Self> {
        config.validate()?;
        if matrix.n_rows() == 0 {
            return Err(ModelError::configuration("feature matrix has no rows"));
        }
        if matrix.n_features() == 0 {
            return Err(ModelError::configuration("feature matrix has no columns"));
        }

        let n_rows = matrix.n_rows();
        let psi = config.subsample_size.min(n_rows);
        let max_depth = max_depth_for(psi);

        let mut seeds = StdRng::seed_from_u64(config.seed);
        let trees: Vec<PartitioningTree> = (0..config.n_estimators)
            .map(|_| {
                let mut rng = StdRng::seed_from_u64(seeds.gen());
                let sample: Vec<&[f64]> = index::sample(&mut rng, n_rows, psi)
                    .iter()
                    .map(|i| matrix.row(i))
                    .collect();
                PartitioningTree::build(sample, max_depth, &mut rng)
            })
            .collect();

        let mut ensemble = Self {
            trees,
            subsample_size: psi,
            n_features: matrix.n_features(),
            threshold: 1.0,
        };

        let mut scores: Vec<f64> = matrix.rows().map(|row| ensemble.score_unchecked(row)).collect();
        scores.sort_by(|a, b| a.total_cmp(b));
        ensemble.threshold = quantile(&scores, 1.0 - config.contamination);

        tracing::debug!(
            "Built isolation ensemble: {} trees, psi={}, max_depth={}, threshold={:.4}",
            ensemble.trees.len(),
            psi,
            max_depth,
            ensemble.threshold
        );

        Ok(ensemble)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn subsample_size(&self) -> usize {
        self.subsample_size
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Decision threshold fixed at training time
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Mean path length of `x` across all trees
    pub fn average_path_length(&self, x: &[f64]) -> ModelResult<f64> {
        self.check_input(x)?;
        Ok(self.mean_path_length(x))
    }

    /// Anomaly score in `(0, 1]`
    pub fn anomaly_score(&self, x: &[f64]) -> ModelResult<f64> {
        self.check_input(x)?;
        Ok(self.score_unchecked(x))
    }

    /// `0.5 − score`; negative values indicate anomalies
    pub fn decision_value(&self, x: &[f64]) -> ModelResult<f64> {
        Ok(0.5 - self.anomaly_score(x)?)
    }

    /// Anomalous iff the score reaches the training threshold
    pub fn classify(&self, x: &[f64]) -> ModelResult<bool> {
        Ok(self.anomaly_score(x)? >= self.threshold)
    }

    fn check_input(&self, x: &[f64]) -> ModelResult<()> {
        if x.len() != self.n_features {
            return Err(ModelError::validation(format!(
                "feature_vector has {} values but the ensemble expects {}",
                x.len(),
                self.n_features
            )));
        }
        ensure_finite(x, "feature_vector")
    }

    fn mean_path_length(&self, x: &[f64]) -> f64 {
        let total: f64 = self.trees.iter().map(|tree| tree.path_length(x)).sum();
        total / self.trees.len() as f64
    }

    fn score_unchecked(&self, x: &[f64]) -> f64 {
        let normaliser = average_path_length(self.subsample_size);
        // ψ <= 1 carries no information; ratio 1 keeps the score at 0.5
        let ratio = if normaliser > 0.0 {
            self.mean_path_length(x) / normaliser
        } else {
            1.0
        };
        2f64.powf(-ratio)
    }
}

/// Linear-interpolated quantile of ascending `sorted`
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => return 1.0,
        1 => return sorted[0],
        _ => {}
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 10x10 grid over [0, 0.9]²
    fn grid_matrix() -> FeatureMatrix {
        let rows = (0..100)
            .map(|i| vec![(i % 10) as f64 * 0.1, (i / 10) as f64 * 0.1])
            .collect();
        FeatureMatrix::from_rows(rows).unwrap()
    }

    fn small_config() -> EnsembleConfig {
        EnsembleConfig {
            n_estimators: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = EnsembleConfig::default();
        assert_eq!(config.n_estimators, 200);
        assert_eq!(config.contamination, 0.05);
        assert_eq!(config.subsample_size, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reject_invalid_config() {
        let matrix = grid_matrix();

        let zero_trees = EnsembleConfig { n_estimators: 0, ..Default::default() };
        assert!(matches!(
            IsolationEnsemble::build(&matrix, &zero_trees),
            Err(ModelError::Configuration(_))
        ));

        for contamination in [0.0, -0.1, 0.6, f64::NAN] {
            let config = EnsembleConfig { contamination, ..Default::default() };
            assert!(matches!(
                IsolationEnsemble::build(&matrix, &config),
                Err(ModelError::Configuration(_))
            ));
        }

        let zero_psi = EnsembleConfig { subsample_size: 0, ..Default::default() };
        assert!(matches!(
            IsolationEnsemble::build(&matrix, &zero_psi),
            Err(ModelError::Configuration(_))
        ));
    }

    #[test]
    fn test_reject_empty_matrix() {
        let empty = FeatureMatrix::from_rows(Vec::new()).unwrap();
        assert!(matches!(
            IsolationEnsemble::build(&empty, &small_config()),
            Err(ModelError::Configuration(_))
        ));

        let no_columns = FeatureMatrix::from_rows(vec![Vec::new(), Vec::new()]).unwrap();
        assert!(matches!(
            IsolationEnsemble::build(&no_columns, &small_config()),
            Err(ModelError::Configuration(_))
        ));
    }

    #[test]
    fn test_subsample_capped_at_rows() {
        let ensemble = IsolationEnsemble::build(&grid_matrix(), &small_config()).unwrap();
        assert_eq!(ensemble.n_trees(), 100);
        assert_eq!(ensemble.subsample_size(), 100);
        assert_eq!(ensemble.n_features(), 2);
    }

    #[test]
    fn test_scores_bounded() {
        let ensemble = IsolationEnsemble::build(&grid_matrix(), &small_config()).unwrap();

        let probes = [
            vec![0.0, 0.0],
            vec![0.45, 0.45],
            vec![0.9, 0.9],
            vec![1e6, -1e6],
            vec![-3.0, 0.2],
        ];
        for probe in &probes {
            let score = ensemble.anomaly_score(probe).unwrap();
            assert!(score > 0.0 && score <= 1.0, "score {} out of range", score);
        }
    }

    #[test]
    fn test_outlier_scores_higher() {
        let ensemble = IsolationEnsemble::build(&grid_matrix(), &small_config()).unwrap();

        let center = ensemble.anomaly_score(&[0.45, 0.45]).unwrap();
        let outlier = ensemble.anomaly_score(&[10.0, 10.0]).unwrap();
        assert!(outlier > center, "outlier={} center={}", outlier, center);

        let center_path = ensemble.average_path_length(&[0.45, 0.45]).unwrap();
        let outlier_path = ensemble.average_path_length(&[10.0, 10.0]).unwrap();
        assert!(outlier_path < center_path);

        assert!(ensemble.decision_value(&[10.0, 10.0]).unwrap() < ensemble.decision_value(&[0.45, 0.45]).unwrap());
    }

    #[test]
    fn test_deterministic_with_seed() {
        let matrix = grid_matrix();
        let first = IsolationEnsemble::build(&matrix, &small_config()).unwrap();
        let second = IsolationEnsemble::build(&matrix, &small_config()).unwrap();

        for probe in [[0.3, 0.7], [5.0, -1.0], [0.0, 0.9]] {
            assert_eq!(
                first.anomaly_score(&probe).unwrap(),
                second.anomaly_score(&probe).unwrap()
            );
        }
        assert_eq!(first.threshold(), second.threshold());
    }

    #[test]
    fn test_threshold_flags_about_contamination() {
        let matrix = grid_matrix();
        let config = EnsembleConfig { contamination: 0.1, ..small_config() };
        let ensemble = IsolationEnsemble::build(&matrix, &config).unwrap();

        let flagged = matrix
            .rows()
            .filter(|row| ensemble.classify(row).unwrap())
            .count();
        assert!(flagged >= 1 && flagged <= 20, "flagged {} of 100", flagged);

        assert!(ensemble.classify(&[10.0, 10.0]).unwrap());
    }

    #[test]
    fn test_dimension_and_finiteness_checked() {
        let ensemble = IsolationEnsemble::build(&grid_matrix(), &small_config()).unwrap();

        assert!(matches!(ensemble.anomaly_score(&[0.1]), Err(ModelError::Validation(_))));
        assert!(matches!(
            ensemble.anomaly_score(&[0.1, 0.2, 0.3]),
            Err(ModelError::Validation(_))
        ));
        assert!(matches!(
            ensemble.classify(&[f64::NAN, 0.2]),
            Err(ModelError::Validation(_))
        ));
    }

    #[test]
    fn test_single_row_scores_half() {
        let matrix = FeatureMatrix::from_rows(vec![vec![1.0, 2.0, 3.0]]).unwrap();
        let ensemble = IsolationEnsemble::build(&matrix, &small_config()).unwrap();

        assert_eq!(ensemble.subsample_size(), 1);
        assert_eq!(ensemble.anomaly_score(&[9.0, 9.0, 9.0]).unwrap(), 0.5);
    }

    #[test]
    fn test_serialized_ensemble_scores_identically() {
        let ensemble = IsolationEnsemble::build(&grid_matrix(), &small_config()).unwrap();
        let json = serde_json::to_vec(&ensemble).unwrap();
        let restored: IsolationEnsemble = serde_json::from_slice(&json).unwrap();

        for probe in [[0.25, 0.65], [3.0, 3.0]] {
            assert_eq!(
                ensemble.anomaly_score(&probe).unwrap(),
                restored.anomaly_score(&probe).unwrap()
            );
        }
        assert_eq!(ensemble.threshold(), restored.threshold());
    }

    #[test]
    fn test_quantile() {
        let sorted = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.0), 0.0);
        assert_eq!(quantile(&sorted, 1.0), 4.0);
        assert_eq!(quantile(&sorted, 0.5), 2.0);
        assert!((quantile(&sorted, 0.95) - 3.8).abs() < 1e-12);
        assert_eq!(quantile(&[0.7], 0.95), 0.7);
    }
}
