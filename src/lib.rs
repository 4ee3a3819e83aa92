//! Vehicle telemetry anomaly scoring service
//!
//! Trains isolation ensembles from telemetry batches, keeps every trained
//! model under a version key, and scores single records against a named
//! (or the latest) version.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  TELEMETRY ANOMALY SERVICE                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌──────────────────┐   ┌────────────────┐  │
//! │  │  HTTP     │──▶│  ScoringService  │──▶│  Isolation     │  │
//! │  │  (Axum)   │   │  train / score   │   │  Ensemble      │  │
//! │  └───────────┘   └────────┬─────────┘   └────────────────┘  │
//! │                           ▼                                 │
//! │                  ┌──────────────────┐                       │
//! │                  │  ArtifactStore   │  versions + LATEST    │
//! │                  └──────────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod detector;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod service;
pub mod store;

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::{get, post, delete},
    middleware as axum_middleware,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
    compression::CompressionLayer,
};

pub use error::{AppError, AppResult, ModelError, ModelResult};

use config::{ArtifactBackend, Config};
use service::ScoringService;
use store::{ArtifactStore, FsArtifactStore, MemoryArtifactStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ScoringService>,
    pub config: Config,
}

impl AppState {
    /// Open the configured artifact store and build the scoring service
    pub fn new(config: Config) -> ModelResult<Self> {
        let store: Arc<dyn ArtifactStore> = match config.artifact_backend {
            ArtifactBackend::Fs => Arc::new(FsArtifactStore::open(&config.model_artifact_dir)?),
            ArtifactBackend::Memory => Arc::new(MemoryArtifactStore::new()),
        };
        Ok(Self::with_store(config, store))
    }

    /// Build state around an existing store
    pub fn with_store(config: Config, store: Arc<dyn ArtifactStore>) -> Self {
        let service = ScoringService::new(store, config.ensemble);
        Self {
            service: Arc::new(service),
            config,
        }
    }
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    // Public routes
    let public_routes = Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::check))
        .route("/health/ready", get(handlers::health::ready))
        .route("/healthz", get(handlers::health::liveness))
        .route("/ingest", post(handlers::telemetry::ingest))
        .route("/score", post(handlers::telemetry::score))
        .route("/models", get(handlers::models::list))
        .route("/models/:version", get(handlers::models::get));

    // Administrative routes (admin JWT)
    let admin_routes = Router::new()
        .route("/models/:version", delete(handlers::models::delete))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_admin_auth
        ));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
}
