//! Scoring service
//!
//! Entry point for the HTTP layer: trains a versioned ensemble from a
//! telemetry batch and scores single records against a stored version.

use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};
use validator::Validate;

use crate::detector::{matrix::ensure_finite, EnsembleConfig, FeatureMatrix, IsolationEnsemble};
use crate::error::{ModelError, ModelResult};
use crate::models::{
    ModelListing, ModelMetadata, ScoreRequest, ScoreResponse, TelemetryBatch, TrainingResponse,
};
use crate::store::{validate_version, ArtifactStore};

/// Format of generated version labels (UTC, second resolution)
pub const VERSION_FORMAT: &str = "%Y%m%d%H%M%S";

/// Issues strictly increasing timestamp labels within one process
#[derive(Debug, Default)]
pub struct VersionClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl VersionClock {
    pub fn next_label(&self) -> String {
        self.next_label_at(Utc::now())
    }

    fn next_label_at(&self, now: DateTime<Utc>) -> String {
        let now = now.with_nanosecond(0).unwrap_or(now);
        let mut last = self.last.lock();

        let issued = match *last {
            Some(prev) if now <= prev => prev + Duration::seconds(1),
            _ => now,
        };
        *last = Some(issued);

        issued.format(VERSION_FORMAT).to_string()
    }
}

pub struct ScoringService {
    store: Arc<dyn ArtifactStore>,
    config: EnsembleConfig,
    clock: VersionClock,
}

impl ScoringService {
    pub fn new(store: Arc<dyn ArtifactStore>, config: EnsembleConfig) -> Self {
        Self {
            store,
            config,
            clock: VersionClock::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Train an isolation ensemble on a batch and persist it as a new version.
    ///
    /// Either the artifact is fully written and becomes latest, or nothing is stored.
    pub fn train(&self, batch: &TelemetryBatch) -> ModelResult<TrainingResponse> {
        check_shape(batch).map_err(|e| {
            warn!("Telemetry batch rejected: {}", e);
            e
        })?;

        let model_version = match &batch.model_version {
            Some(label) => label.clone(),
            None => self.clock.next_label(),
        };
        validate_version(&model_version)?;

        let rows = batch
            .records
            .iter()
            .map(|record| record.feature_vector.clone())
            .collect();
        let matrix = FeatureMatrix::from_rows(rows).map_err(|e| {
            warn!("Telemetry batch rejected: {}", e);
            e
        })?;

        let ensemble = IsolationEnsemble::build(&matrix, &self.config)?;
        let metadata = ModelMetadata::new(&model_version, &self.config, matrix.n_features());

        let artifact = self.store.save(&model_version, ensemble, metadata)?;

        info!(
            "Trained model version {} on {} records ({} features)",
            model_version,
            batch.records.len(),
            artifact.metadata.n_features
        );

        Ok(TrainingResponse {
            model_version,
            record_count: batch.records.len(),
            metadata: artifact.metadata.clone(),
        })
    }

    /// Score one record against the requested version, or latest if none given
    pub fn score(&self, request: &ScoreRequest) -> ModelResult<ScoreResponse> {
        check_shape(request)?;
        ensure_finite(&request.feature_vector, "feature_vector")?;

        let model_version = match &request.model_version {
            Some(version) => version.clone(),
            None => self.store.latest_version()?,
        };
        let artifact = self.store.load(&model_version)?;

        let expected = artifact.metadata.n_features;
        if request.feature_vector.len() != expected {
            return Err(ModelError::validation(format!(
                "feature_vector has {} values but model '{}' expects {}",
                request.feature_vector.len(),
                model_version,
                expected
            )));
        }

        let anomaly_score = artifact.ensemble.anomaly_score(&request.feature_vector)?;
        let is_anomaly = anomaly_score >= artifact.ensemble.threshold();

        Ok(ScoreResponse {
            vehicle_id: request.vehicle_id.clone(),
            timestamp: request.timestamp,
            model_version,
            anomaly_score,
            is_anomaly,
        })
    }

    pub fn metadata(&self, version: &str) -> ModelResult<ModelMetadata> {
        Ok(self.store.load(version)?.metadata.clone())
    }

    pub fn list_models(&self) -> ModelResult<ModelListing> {
        let latest = match self.store.latest_version() {
            Ok(version) => Some(version),
            Err(ModelError::NoTrainedModel) => None,
            Err(e) => return Err(e),
        };
        Ok(ModelListing {
            latest,
            versions: self.store.list_versions()?,
        })
    }

    pub fn delete(&self, version: &str) -> ModelResult<()> {
        self.store.delete(version)
    }

    /// Forget loaded artifacts; they are re-read from the store on next use
    pub fn reset(&self) {
        self.store.clear_cache();
    }
}

fn check_shape<T: Validate>(value: &T) -> ModelResult<()> {
    value
        .validate()
        .map_err(|e| ModelError::validation(e.to_string()))
}
