//! Prediction handler

use std::time::Instant;

use axum::{extract::State, Json};
use chrono::Utc;

use crate::models::{PredictionRequest, PredictionResponse};
use crate::{pipeline, AppResult, AppState};

/// Make temperature prediction
pub async fn predict(
    State(state): State<AppState>,
    Json(req): Json<PredictionRequest>,
) -> AppResult<Json<PredictionResponse>> {
    let start = Instant::now();

    let result = pipeline::run(&state, req.features).await;

    // Recorded for every outcome, including rejected requests.
    state
        .metrics
        .record_request(result.is_ok(), start.elapsed().as_secs_f64());

    let outcome = result.map_err(|e| {
        tracing::debug!("Prediction rejected: {}", e);
        e
    })?;

    Ok(Json(PredictionResponse {
        prediction: outcome.prediction,
        timestamp: Utc::now().to_rfc3339(),
        model_version: outcome.model_version,
    }))
}
