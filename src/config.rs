//! Configuration module

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::detector::ensemble::{
    DEFAULT_CONTAMINATION, DEFAULT_N_ESTIMATORS, DEFAULT_RANDOM_SEED, DEFAULT_SUBSAMPLE_SIZE,
};
use crate::detector::EnsembleConfig;
use crate::error::{ModelError, ModelResult};

/// Where trained artifacts live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactBackend {
    /// Files under `model_artifact_dir`
    Fs,
    /// Process memory only
    Memory,
}

impl FromStr for ArtifactBackend {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fs" | "filesystem" => Ok(ArtifactBackend::Fs),
            "memory" => Ok(ArtifactBackend::Memory),
            other => Err(ModelError::configuration(format!(
                "unknown artifact backend '{}' (expected 'fs' or 'memory')",
                other
            ))),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Artifact store root directory
    pub model_artifact_dir: PathBuf,

    /// Artifact store backend
    pub artifact_backend: ArtifactBackend,

    /// JWT secret key for admin routes
    pub jwt_secret: String,

    /// Allowed CORS origins (empty = any)
    pub cors_origins: Vec<String>,

    /// Emit JSON log lines
    pub json_logs: bool,

    /// Ensemble training parameters
    pub ensemble: EnsembleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            environment: "development".to_string(),
            model_artifact_dir: PathBuf::from("artifacts"),
            artifact_backend: ArtifactBackend::Fs,
            jwt_secret: "telemetry-anomaly-dev-secret-change-in-production".to_string(),
            cors_origins: Vec::new(),
            json_logs: false,
            ensemble: EnsembleConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),

            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),

            environment: lookup("ENVIRONMENT").unwrap_or(defaults.environment),

            model_artifact_dir: lookup("MODEL_ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_artifact_dir),

            artifact_backend: match lookup("ARTIFACT_BACKEND").map(|v| v.parse()) {
                Some(Ok(backend)) => backend,
                Some(Err(e)) => {
                    warn!("{}; using the filesystem store", e);
                    defaults.artifact_backend
                }
                None => defaults.artifact_backend,
            },

            jwt_secret: lookup("JWT_SECRET").unwrap_or(defaults.jwt_secret),

            cors_origins: lookup("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),

            json_logs: lookup("LOG_FORMAT").as_deref() == Some("json"),

            ensemble: EnsembleConfig {
                n_estimators: parse_var(&lookup, "N_ESTIMATORS").unwrap_or(DEFAULT_N_ESTIMATORS),
                contamination: parse_var(&lookup, "CONTAMINATION").unwrap_or(DEFAULT_CONTAMINATION),
                subsample_size: parse_var(&lookup, "SUBSAMPLE_SIZE").unwrap_or(DEFAULT_SUBSAMPLE_SIZE),
                seed: parse_var(&lookup, "RANDOM_SEED").unwrap_or(DEFAULT_RANDOM_SEED),
            },
        }
    }

    /// Reject settings the service cannot train with
    pub fn validate(&self) -> ModelResult<()> {
        self.ensemble.validate()
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Parse a variable, `None` if unset or unparsable
fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.port, 8000);
        assert_eq!(config.model_artifact_dir, PathBuf::from("artifacts"));
        assert_eq!(config.artifact_backend, ArtifactBackend::Fs);
        assert_eq!(config.ensemble, EnsembleConfig::default());
        assert!(config.cors_origins.is_empty());
        assert!(!config.is_production());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "9090"),
            ("ENVIRONMENT", "production"),
            ("MODEL_ARTIFACT_DIR", "/var/lib/models"),
            ("ARTIFACT_BACKEND", "memory"),
            ("CORS_ORIGINS", "https://a.example, https://b.example,"),
            ("N_ESTIMATORS", "50"),
            ("CONTAMINATION", "0.1"),
            ("LOG_FORMAT", "json"),
        ]);

        assert_eq!(config.port, 9090);
        assert!(config.is_production());
        assert_eq!(config.model_artifact_dir, PathBuf::from("/var/lib/models"));
        assert_eq!(config.artifact_backend, ArtifactBackend::Memory);
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.ensemble.n_estimators, 50);
        assert_eq!(config.ensemble.contamination, 0.1);
        assert_eq!(config.ensemble.subsample_size, 256);
        assert!(config.json_logs);
    }

    #[test]
    fn test_artifact_backend_parsing() {
        assert_eq!("fs".parse::<ArtifactBackend>().unwrap(), ArtifactBackend::Fs);
        assert_eq!(" Memory ".parse::<ArtifactBackend>().unwrap(), ArtifactBackend::Memory);
        assert!(matches!(
            "memroy".parse::<ArtifactBackend>(),
            Err(ModelError::Configuration(_))
        ));

        // unknown values keep the durable default
        let config = config_from(&[("ARTIFACT_BACKEND", "s3")]);
        assert_eq!(config.artifact_backend, ArtifactBackend::Fs);
    }

    #[test]
    fn test_validate_rejects_bad_ensemble_settings() {
        assert!(config_from(&[]).validate().is_ok());

        for (key, value) in [("CONTAMINATION", "0.7"), ("N_ESTIMATORS", "0"), ("SUBSAMPLE_SIZE", "0")] {
            let config = config_from(&[(key, value)]);
            assert!(
                matches!(config.validate(), Err(ModelError::Configuration(_))),
                "{}={} should be rejected",
                key,
                value
            );
        }
    }

    #[test]
    fn test_unparsable_numbers_fall_back() {
        let config = config_from(&[("PORT", "eighty"), ("N_ESTIMATORS", "-3")]);
        assert_eq!(config.port, 8000);
        assert_eq!(config.ensemble.n_estimators, 200);
    }
}
