//! Telemetry records and the train/score request shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::ModelMetadata;

/// A single telemetry measurement for a vehicle
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TelemetryRecord {
    #[validate(length(min = 1, max = 64))]
    pub vehicle_id: String,
    pub timestamp: DateTime<Utc>,
    #[validate(length(min = 1))]
    pub feature_vector: Vec<f64>,
}

/// Batch payload used to train a new model version
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TelemetryBatch {
    #[validate(length(min = 1), nested)]
    pub records: Vec<TelemetryRecord>,
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub model_version: Option<String>,
}

/// Response returned after training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingResponse {
    pub model_version: String,
    pub record_count: usize,
    pub metadata: ModelMetadata,
}

/// Request payload for scoring a single telemetry record
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ScoreRequest {
    #[validate(length(min = 1, max = 64))]
    pub vehicle_id: String,
    pub timestamp: DateTime<Utc>,
    #[validate(length(min = 1))]
    pub feature_vector: Vec<f64>,
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub model_version: Option<String>,
}

impl ScoreRequest {
    /// Score a record against the latest model
    pub fn for_latest(record: TelemetryRecord) -> Self {
        Self {
            vehicle_id: record.vehicle_id,
            timestamp: record.timestamp,
            feature_vector: record.feature_vector,
            model_version: None,
        }
    }

    /// Score a record against an explicit model version
    pub fn for_version(record: TelemetryRecord, version: impl Into<String>) -> Self {
        Self {
            model_version: Some(version.into()),
            ..Self::for_latest(record)
        }
    }
}

/// Response payload for anomaly scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub vehicle_id: String,
    pub timestamp: DateTime<Utc>,
    pub model_version: String,
    pub anomaly_score: f64,
    pub is_anomaly: bool,
}
