//! Prediction pipeline
//!
//! Per request: validate -> re-order -> classify drift -> update statistics
//! -> score. Validation comes first so incomplete requests never reach the
//! running statistics.

use std::sync::Arc;

use crate::drift::DriftVerdict;
use crate::features::FeatureVector;
use crate::{AppError, AppResult, AppState};

#[derive(Debug)]
pub struct PredictionOutcome {
    pub prediction: f64,
    pub model_version: String,
    pub verdict: DriftVerdict,
}

pub async fn run(state: &AppState, features: FeatureVector) -> AppResult<PredictionOutcome> {
    let model = state.model.current()?;

    let (expected, row) = match model.expected_features() {
        Some(expected) => {
            let row = features.ordered(expected).map_err(AppError::MissingFeatures)?;
            (expected.to_vec(), row)
        }
        // Advisory mode: trust the caller's names and order.
        None => (features.names(), features.values()),
    };

    let verdict = state.drift.lock().observe(&expected, &features);

    state
        .metrics
        .record_drift(verdict.ratio, &verdict.offending_features);
    if verdict.flagged {
        tracing::warn!(
            "Input drift on {:?} (ratio {:.3})",
            verdict.offending_features,
            verdict.ratio
        );
    }

    let holder = Arc::clone(&state.model);
    let prediction = tokio::task::spawn_blocking(move || holder.predict(&row)).await??;

    Ok(PredictionOutcome {
        prediction,
        model_version: model.version().to_string(),
        verdict,
    })
}
