//! Drift statistics handler

use axum::{extract::State, Json};

use crate::models::DriftStatsResponse;
use crate::AppState;

/// Read-only view of the running per-feature statistics
pub async fn stats(State(state): State<AppState>) -> Json<DriftStatsResponse> {
    let monitor = state.drift.lock();
    let config = *monitor.config();

    Json(DriftStatsResponse {
        snapshot: monitor.snapshot(),
        cold_start: monitor.is_empty(),
        threshold_std: config.threshold_std,
        min_samples: config.min_samples,
    })
}
