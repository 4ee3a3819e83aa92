//! Filesystem artifact store
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/LATEST                                 latest version label
//! <root>/models/<version>.<sha>.ensemble.json   serialized ensemble
//! <root>/models/<version>.metadata.json         metadata + ensemble file name and checksum
//! ```
//!
//! Ensemble files are named by content, so writing one never disturbs the
//! ensemble an existing metadata record points at. The metadata rename is the
//! commit point: an artifact exists iff its metadata file exists. If moving
//! `LATEST` fails afterwards, the previous metadata is put back.
//!
//! There is no cross-process lock: two processes saving into one directory
//! may race on which version ends up latest.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{check_metadata_version, validate_version, Artifact, ArtifactStore};
use crate::detector::IsolationEnsemble;
use crate::error::{ModelError, ModelResult};
use crate::models::ModelMetadata;

const LATEST_FILE: &str = "LATEST";
const MODELS_DIR: &str = "models";
const ENSEMBLE_SUFFIX: &str = ".ensemble.json";
const METADATA_SUFFIX: &str = ".metadata.json";
/// Hex digits of the checksum used in ensemble file names
const CONTENT_TAG_LEN: usize = 16;

/// Metadata record as stored on disk
#[derive(Debug, Serialize, Deserialize)]
struct MetadataRecord {
    #[serde(flatten)]
    metadata: ModelMetadata,
    ensemble_file: String,
    ensemble_sha256: String,
}

/// Durable artifact store rooted at a directory
pub struct FsArtifactStore {
    root: PathBuf,
    /// Exclusive for save/delete, shared for reads of files on disk
    gate: RwLock<()>,
    cache: RwLock<HashMap<String, Arc<Artifact>>>,
}

impl FsArtifactStore {
    /// Open (creating if needed) a store at `root`
    pub fn open<P: AsRef<Path>>(root: P) -> ModelResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(MODELS_DIR))?;

        info!("Artifact store opened at {:?}", root);
        Ok(Self {
            root,
            gate: RwLock::new(()),
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn latest_path(&self) -> PathBuf {
        self.root.join(LATEST_FILE)
    }

    fn models_dir(&self) -> PathBuf {
        self.root.join(MODELS_DIR)
    }

    fn metadata_path(&self, version: &str) -> PathBuf {
        self.models_dir().join(format!("{}{}", version, METADATA_SUFFIX))
    }

    fn read_record(&self, version: &str) -> ModelResult<Option<MetadataRecord>> {
        match fs::read(self.metadata_path(version)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_from_disk(&self, version: &str) -> ModelResult<Artifact> {
        let record = self
            .read_record(version)?
            .ok_or_else(|| ModelError::VersionNotFound(version.to_string()))?;

        if !owns_ensemble_file(version, &record.ensemble_file) {
            warn!("Metadata for model version {} names a foreign ensemble file", version);
            return Err(ModelError::Corrupt { version: version.to_string() });
        }

        let ensemble_bytes = match fs::read(self.models_dir().join(&record.ensemble_file)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Ensemble file missing for model version {}", version);
                return Err(ModelError::Corrupt { version: version.to_string() });
            }
            Err(e) => return Err(e.into()),
        };
        if sha256_hex(&ensemble_bytes) != record.ensemble_sha256 {
            warn!("Checksum mismatch for model version {}", version);
            return Err(ModelError::Corrupt { version: version.to_string() });
        }
        let ensemble: IsolationEnsemble = serde_json::from_slice(&ensemble_bytes)?;

        if ensemble.n_features() != record.metadata.n_features
            || record.metadata.model_version != version
        {
            warn!("Metadata does not describe ensemble for model version {}", version);
            return Err(ModelError::Corrupt { version: version.to_string() });
        }

        Ok(Artifact {
            ensemble,
            metadata: record.metadata,
        })
    }

    /// Put `version` back the way it was before a failed save
    fn roll_back(&self, version: &str, previous: Option<&[u8]>, new_ensemble: Option<&Path>) {
        let metadata_path = self.metadata_path(version);
        let restored = match previous {
            Some(bytes) => write_atomic(&metadata_path, bytes),
            None => remove_if_present(&metadata_path),
        };
        if let Err(e) = restored {
            error!("Failed to roll back metadata for model version {}: {}", version, e);
        }
        if let Some(path) = new_ensemble {
            if let Err(e) = remove_if_present(path) {
                warn!("Failed to remove orphaned ensemble {:?}: {}", path, e);
            }
        }
        self.cache.write().remove(version);
    }
}

impl ArtifactStore for FsArtifactStore {
    fn save(
        &self,
        version: &str,
        ensemble: IsolationEnsemble,
        metadata: ModelMetadata,
    ) -> ModelResult<Arc<Artifact>> {
        validate_version(version)?;
        check_metadata_version(version, &metadata)?;

        let ensemble_bytes = serde_json::to_vec(&ensemble)?;
        let checksum = sha256_hex(&ensemble_bytes);
        let ensemble_file = format!(
            "{}.{}{}",
            version,
            &checksum[..CONTENT_TAG_LEN],
            ENSEMBLE_SUFFIX
        );
        let record = MetadataRecord {
            metadata,
            ensemble_file,
            ensemble_sha256: checksum,
        };
        let record_bytes = serde_json::to_vec_pretty(&record)?;

        let _gate = self.gate.write();

        let metadata_path = self.metadata_path(version);
        let previous_bytes = match fs::read(&metadata_path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let previous_file = previous_bytes
            .as_deref()
            .and_then(|bytes| serde_json::from_slice::<MetadataRecord>(bytes).ok())
            .map(|prev| prev.ensemble_file);

        let ensemble_path = self.models_dir().join(&record.ensemble_file);
        // identical content may already be on disk under this name
        let created = if ensemble_path.exists() {
            None
        } else {
            write_atomic(&ensemble_path, &ensemble_bytes)?;
            Some(ensemble_path.as_path())
        };
        debug!("Isolation ensemble persisted at {:?}", ensemble_path);

        // commit point
        if let Err(e) = write_atomic(&metadata_path, &record_bytes) {
            self.roll_back(version, previous_bytes.as_deref(), created);
            return Err(e.into());
        }

        if let Err(e) = write_atomic(&self.latest_path(), version.as_bytes()) {
            error!("Failed to move latest pointer to version {}: {}", version, e);
            self.roll_back(version, previous_bytes.as_deref(), created);
            return Err(e.into());
        }

        if let Some(stale) = previous_file.filter(|name| *name != record.ensemble_file) {
            if owns_ensemble_file(version, &stale) {
                if let Err(e) = remove_if_present(&self.models_dir().join(&stale)) {
                    warn!("Failed to remove replaced ensemble {}: {}", stale, e);
                }
            }
        }

        let artifact = Arc::new(Artifact {
            ensemble,
            metadata: record.metadata,
        });
        self.cache
            .write()
            .insert(version.to_string(), Arc::clone(&artifact));

        info!("Model version {} saved; latest pointer updated", version);
        Ok(artifact)
    }

    fn load(&self, version: &str) -> ModelResult<Arc<Artifact>> {
        // names that could never have been saved are simply unknown
        if validate_version(version).is_err() {
            return Err(ModelError::VersionNotFound(version.to_string()));
        }

        if let Some(artifact) = self.cache.read().get(version) {
            debug!("Model version {} served from cache", version);
            return Ok(Arc::clone(artifact));
        }

        let _gate = self.gate.read();
        let artifact = Arc::new(self.read_from_disk(version)?);
        self.cache
            .write()
            .insert(version.to_string(), Arc::clone(&artifact));

        info!("Model version {} loaded from {:?}", version, self.root);
        Ok(artifact)
    }

    fn latest_version(&self) -> ModelResult<String> {
        let _gate = self.gate.read();
        match fs::read_to_string(self.latest_path()) {
            Ok(content) => {
                let version = content.trim();
                if version.is_empty() {
                    Err(ModelError::NoTrainedModel)
                } else {
                    Ok(version.to_string())
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ModelError::NoTrainedModel),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, version: &str) -> ModelResult<()> {
        if validate_version(version).is_err() {
            return Err(ModelError::VersionNotFound(version.to_string()));
        }

        let _gate = self.gate.write();

        let ensemble_file = self
            .read_record(version)
            .ok()
            .flatten()
            .map(|record| record.ensemble_file);

        // metadata first: once it is gone the artifact no longer exists
        match fs::remove_file(self.metadata_path(version)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ModelError::VersionNotFound(version.to_string()))
            }
            Err(e) => return Err(e.into()),
        }
        self.cache.write().remove(version);

        match ensemble_file.filter(|name| owns_ensemble_file(version, name)) {
            Some(name) => remove_if_present(&self.models_dir().join(name))?,
            None => warn!("Ensemble file for model version {} could not be located", version),
        }

        let latest = fs::read_to_string(self.latest_path()).ok();
        if latest.as_deref().map(str::trim) == Some(version) {
            fs::remove_file(self.latest_path())?;
            info!("Latest model pointer cleared (version {} deleted)", version);
        }

        info!("Model version {} deleted", version);
        Ok(())
    }

    fn list_versions(&self) -> ModelResult<Vec<String>> {
        let _gate = self.gate.read();
        let mut versions = Vec::new();

        for entry in fs::read_dir(self.models_dir())? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            if let Some(version) = name.strip_suffix(METADATA_SUFFIX) {
                versions.push(version.to_string());
            }
        }

        versions.sort();
        Ok(versions)
    }

    fn clear_cache(&self) {
        self.cache.write().clear();
    }
}

/// `<version>.<hex tag>.ensemble.json` and nothing else
fn owns_ensemble_file(version: &str, name: &str) -> bool {
    name.strip_prefix(version)
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.strip_suffix(ENSEMBLE_SUFFIX))
        .map_or(false, |tag| {
            tag.len() == CONTENT_TAG_LEN && tag.chars().all(|c| c.is_ascii_hexdigit())
        })
}

/// Write to a temp file in the target's directory, then rename over the target
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = dir.join(format!(".{}.tmp", Uuid::new_v4()));

    let result = File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&tmp, path));

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
