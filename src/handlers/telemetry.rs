//! Telemetry ingestion (training) and scoring handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};

use crate::{AppResult, AppState};
use crate::models::{ScoreRequest, ScoreResponse, TelemetryBatch, TrainingResponse};

/// Train a new model version from a telemetry batch
pub async fn ingest(
    State(state): State<AppState>,
    payload: Result<Json<TelemetryBatch>, JsonRejection>,
) -> AppResult<(StatusCode, Json<TrainingResponse>)> {
    let Json(batch) = payload?;
    let service = state.service.clone();

    // tree building is CPU-bound; keep it off the async workers
    let result = tokio::task::spawn_blocking(move || service.train(&batch)).await??;

    tracing::info!("Telemetry ingestion completed for version {}", result.model_version);

    Ok((StatusCode::CREATED, Json(result)))
}

/// Score a telemetry record against the requested (or latest) model version
pub async fn score(
    State(state): State<AppState>,
    payload: Result<Json<ScoreRequest>, JsonRejection>,
) -> AppResult<Json<ScoreResponse>> {
    let Json(request) = payload?;
    let service = state.service.clone();

    let response = tokio::task::spawn_blocking(move || service.score(&request))
        .await?
        .map_err(|e| {
            if e.is_not_found() {
                tracing::warn!("Model version not available: {}", e);
            }
            e
        })?;

    tracing::info!(
        "Telemetry scored for vehicle {} with version {}",
        response.vehicle_id,
        response.model_version
    );

    Ok(Json(response))
}
