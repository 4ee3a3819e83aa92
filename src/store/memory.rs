//! Process-local artifact store
//!
//! Artifacts and the latest pointer share one lock, so a save is a single
//! atomic step. Nothing survives a restart.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::{check_metadata_version, validate_version, Artifact, ArtifactStore};
use crate::detector::IsolationEnsemble;
use crate::error::{ModelError, ModelResult};
use crate::models::ModelMetadata;

#[derive(Default)]
struct State {
    artifacts: HashMap<String, Arc<Artifact>>,
    latest: Option<String>,
}

#[derive(Default)]
pub struct MemoryArtifactStore {
    state: RwLock<State>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn save(
        &self,
        version: &str,
        ensemble: IsolationEnsemble,
        metadata: ModelMetadata,
    ) -> ModelResult<Arc<Artifact>> {
        validate_version(version)?;
        check_metadata_version(version, &metadata)?;

        let artifact = Arc::new(Artifact { ensemble, metadata });
        let mut state = self.state.write();
        state
            .artifacts
            .insert(version.to_string(), Arc::clone(&artifact));
        state.latest = Some(version.to_string());

        info!("Updated latest model pointer to version {}", version);
        Ok(artifact)
    }

    fn load(&self, version: &str) -> ModelResult<Arc<Artifact>> {
        self.state
            .read()
            .artifacts
            .get(version)
            .cloned()
            .ok_or_else(|| ModelError::VersionNotFound(version.to_string()))
    }

    fn latest_version(&self) -> ModelResult<String> {
        self.state
            .read()
            .latest
            .clone()
            .ok_or(ModelError::NoTrainedModel)
    }

    fn delete(&self, version: &str) -> ModelResult<()> {
        let mut state = self.state.write();
        if state.artifacts.remove(version).is_none() {
            return Err(ModelError::VersionNotFound(version.to_string()));
        }
        if state.latest.as_deref() == Some(version) {
            state.latest = None;
        }

        info!("Model version {} deleted", version);
        Ok(())
    }

    fn list_versions(&self) -> ModelResult<Vec<String>> {
        let mut versions: Vec<String> = self.state.read().artifacts.keys().cloned().collect();
        versions.sort();
        Ok(versions)
    }

    fn clear_cache(&self) {}
}
