//! Service status models

use serde::{Deserialize, Serialize};

use crate::drift::DriftSnapshot;

pub const SERVICE_NAME: &str = "Lahore Temperature Prediction API";

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    pub model_loaded: bool,
    pub model_version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub model_version: String,
}

#[derive(Debug, Serialize)]
pub struct DriftStatsResponse {
    #[serde(flatten)]
    pub snapshot: DriftSnapshot,
    /// No request has been folded in yet
    pub cold_start: bool,
    pub threshold_std: f64,
    pub min_samples: u64,
}
