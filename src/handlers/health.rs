//! Health check handler

use axum::{extract::State, Json};
use chrono::Utc;

use crate::models::HealthResponse;
use crate::{AppResult, AppState};

/// 200 while a model is loaded, 503 otherwise
pub async fn check(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let model = state.model.current()?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        model_version: model.version().to_string(),
    }))
}
