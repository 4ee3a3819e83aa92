//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    timestamp: i64,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    latest_model: Option<String>,
    model_count: usize,
}

#[derive(Serialize)]
pub struct ServiceInfo {
    message: String,
    version: &'static str,
    environment: String,
}

pub async fn root(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: format!("Welcome to {}", env!("CARGO_PKG_NAME")),
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
    })
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

/// Ready when the artifact store can be listed
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let service = state.service.clone();
    let listing = tokio::task::spawn_blocking(move || service.list_models()).await;

    let (status, label, latest_model, model_count) = match listing {
        Ok(Ok(listing)) => (StatusCode::OK, "ready", listing.latest, listing.versions.len()),
        Ok(Err(e)) => {
            tracing::error!("Readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable", None, 0)
        }
        Err(e) => {
            tracing::error!("Readiness check task failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable", None, 0)
        }
    };

    (
        status,
        Json(ReadinessResponse {
            status: label,
            version: env!("CARGO_PKG_VERSION"),
            environment: state.config.environment.clone(),
            latest_model,
            model_count,
        }),
    )
}

/// Liveness probe
pub async fn liveness() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
