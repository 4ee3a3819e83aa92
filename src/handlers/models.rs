//! Model version handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{AppResult, AppState};
use crate::middleware::auth::AdminContext;
use crate::models::{ModelListing, ModelMetadata};

/// List stored model versions and the latest pointer
pub async fn list(State(state): State<AppState>) -> AppResult<Json<ModelListing>> {
    let service = state.service.clone();
    let listing = tokio::task::spawn_blocking(move || service.list_models()).await??;
    Ok(Json(listing))
}

/// Metadata of one model version
pub async fn get(
    State(state): State<AppState>,
    Path(version): Path<String>,
) -> AppResult<Json<ModelMetadata>> {
    let service = state.service.clone();
    let metadata = tokio::task::spawn_blocking(move || service.metadata(&version)).await??;
    Ok(Json(metadata))
}

/// Delete a model version (admin only)
pub async fn delete(
    State(state): State<AppState>,
    admin: AdminContext,
    Path(version): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let service = state.service.clone();
    let target = version.clone();
    tokio::task::spawn_blocking(move || service.delete(&target)).await??;

    tracing::info!("Model version deleted: {} by {}", version, admin.subject);

    Ok(Json(serde_json::json!({
        "success": true,
        "model_version": version
    })))
}
