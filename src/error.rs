//! Error handling

use axum::{
    extract::rejection::JsonRejection,
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result alias for the detection core (ensemble, store, scoring service)
pub type ModelResult<T> = Result<T, ModelError>;

/// Failures raised by the detection core.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Invalid ensemble build parameters (zero estimators, empty matrix, bad contamination)
    #[error("invalid ensemble configuration: {0}")]
    Configuration(String),

    /// Request rejected before any state was touched
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("model version '{0}' is not available")]
    VersionNotFound(String),

    #[error("no trained model available")]
    NoTrainedModel,

    #[error("artifact storage failure: {0}")]
    Storage(#[from] std::io::Error),

    #[error("artifact encoding failure: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("artifact for model version '{version}' failed its integrity check")]
    Corrupt { version: String },
}

impl ModelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ModelError::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        ModelError::Configuration(msg.into())
    }

    /// Unknown version or nothing trained yet
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModelError::VersionNotFound(_) | ModelError::NoTrainedModel)
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Auth errors
    TokenInvalid,
    Unauthorized,
    Forbidden,

    // Resource errors
    NotFound(String),

    // Validation errors
    ValidationError(String),

    // Artifact store errors
    StorageError(String),

    // Generic errors
    InternalError(String),
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, &str) {
        match self {
            AppError::TokenInvalid => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Access denied"),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.as_str()),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::StorageError(msg) => {
                tracing::error!("Artifact store error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Model artifact storage error")
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = self.status_and_message();

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Configuration(_) | ModelError::Validation(_) => {
                AppError::ValidationError(err.to_string())
            }
            ModelError::VersionNotFound(_) | ModelError::NoTrainedModel => {
                AppError::NotFound(err.to_string())
            }
            ModelError::Storage(_) | ModelError::Encoding(_) | ModelError::Corrupt { .. } => {
                AppError::StorageError(err.to_string())
            }
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        AppError::TokenInvalid
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(format!("invalid request body: {}", rejection.body_text()))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::InternalError(format!("worker task failed: {}", err))
    }
}
