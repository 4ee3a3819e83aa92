//! Versioned artifact store
//!
//! Persists trained ensembles with their metadata under a version key and
//! tracks which version is "latest". The latest pointer is only moved after an
//! artifact is completely written, so a reader never resolves to a partial one.

pub mod fs;
pub mod memory;

use std::sync::Arc;

use crate::detector::IsolationEnsemble;
use crate::error::{ModelError, ModelResult};
use crate::models::ModelMetadata;

pub use self::fs::FsArtifactStore;
pub use self::memory::MemoryArtifactStore;

pub const MAX_VERSION_LEN: usize = 128;

/// A trained ensemble and its metadata, immutable once stored
#[derive(Debug, Clone)]
pub struct Artifact {
    pub ensemble: IsolationEnsemble,
    pub metadata: ModelMetadata,
}

/// Storage backend for trained models
pub trait ArtifactStore: Send + Sync {
    /// Write the artifact for `version`, then point latest at it.
    /// Reusing a version silently replaces its artifact.
    fn save(
        &self,
        version: &str,
        ensemble: IsolationEnsemble,
        metadata: ModelMetadata,
    ) -> ModelResult<Arc<Artifact>>;

    /// Load the artifact for `version`
    fn load(&self, version: &str) -> ModelResult<Arc<Artifact>>;

    /// Current latest version; `NoTrainedModel` before the first save
    fn latest_version(&self) -> ModelResult<String>;

    /// Remove an artifact; clears latest if it pointed at `version`
    fn delete(&self, version: &str) -> ModelResult<()>;

    /// All stored versions, sorted
    fn list_versions(&self) -> ModelResult<Vec<String>>;

    /// Drop any in-memory copies of loaded artifacts
    fn clear_cache(&self);
}

/// Check a version label is usable as a storage key (and file name)
pub fn validate_version(version: &str) -> ModelResult<()> {
    if version.is_empty() || version.len() > MAX_VERSION_LEN {
        return Err(ModelError::validation(format!(
            "model_version must be 1 to {} characters",
            MAX_VERSION_LEN
        )));
    }
    if version.starts_with('.') {
        return Err(ModelError::validation(format!(
            "model_version '{}' must not start with '.'",
            version
        )));
    }
    if let Some(bad) = version
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(ModelError::validation(format!(
            "model_version '{}' contains unsupported character {:?}",
            version, bad
        )));
    }
    Ok(())
}

fn check_metadata_version(version: &str, metadata: &ModelMetadata) -> ModelResult<()> {
    if metadata.model_version != version {
        return Err(ModelError::validation(format!(
            "metadata is for model version '{}', not '{}'",
            metadata.model_version, version
        )));
    }
    Ok(())
}
