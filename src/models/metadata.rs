//! Metadata persisted alongside each trained ensemble

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detector::EnsembleConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    pub n_estimators: usize,
    pub contamination: f64,
    pub n_features: usize,
}

impl ModelMetadata {
    pub fn new(model_version: &str, config: &EnsembleConfig, n_features: usize) -> Self {
        Self {
            model_version: model_version.to_string(),
            trained_at: Utc::now(),
            n_estimators: config.n_estimators,
            contamination: config.contamination,
            n_features,
        }
    }
}

/// Listing of stored model versions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelListing {
    pub latest: Option<String>,
    pub versions: Vec<String>,
}
