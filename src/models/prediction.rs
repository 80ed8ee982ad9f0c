//! Prediction models

use serde::{Deserialize, Serialize};

use crate::features::FeatureVector;

#[derive(Debug, Deserialize)]
pub struct PredictionRequest {
    /// Feature values keyed by name
    pub features: FeatureVector,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: f64,
    /// RFC 3339, UTC
    pub timestamp: String,
    pub model_version: String,
}
