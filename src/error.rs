//! Error handling

use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;

use crate::inference::ModelError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // No model loaded (still loading, or load failed)
    #[error("Model not loaded")]
    ModelUnavailable,

    // Client errors
    #[error("Missing features: {0:?}")]
    MissingFeatures(Vec<String>),

    // Predictor raised during scoring
    #[error("Inference failed: {0}")]
    InferenceFailure(String),

    // Generic errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::MissingFeatures(_) => StatusCode::BAD_REQUEST,
            AppError::InferenceFailure(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            AppError::ModelUnavailable => json!({
                "error": "Model not loaded",
                "status": status.as_u16()
            }),
            AppError::MissingFeatures(missing) => json!({
                "error": self.to_string(),
                "missing": missing,
                "status": status.as_u16()
            }),
            AppError::InferenceFailure(msg) => {
                tracing::error!("Inference failure: {}", msg);
                json!({
                    "error": self.to_string(),
                    "status": status.as_u16()
                })
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                json!({
                    "error": "Internal server error",
                    "status": status.as_u16()
                })
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Unavailable => AppError::ModelUnavailable,
            ModelError::Inference(e) => AppError::InferenceFailure(e.0),
        }
    }
}

impl From<prometheus::Error> for AppError {
    fn from(err: prometheus::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::InferenceFailure(format!("scoring task aborted: {}", err))
    }
}
