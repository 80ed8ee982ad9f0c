//! Configuration module

use std::env;
use std::str::FromStr;

use crate::drift::{monitor, DriftConfig};
use crate::inference::{ModelSource, Stage};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Model registry location (`file:` URI or path)
    pub registry_uri: String,

    /// Registered model name
    pub model_name: String,

    /// Preferred deployment stage, `None` means no preference
    pub model_stage: Option<Stage>,

    /// Server port
    pub port: u16,

    /// Drift classification policy
    pub drift: DriftConfig,

    /// Emit JSON log lines instead of the human-readable format
    pub log_json: bool,

    /// Environment (development, production)
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, falling back to defaults for
    /// absent or unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            registry_uri: lookup("MLFLOW_TRACKING_URI")
                .unwrap_or_else(|| "file:./mlruns".to_string()),

            model_name: lookup("MODEL_NAME")
                .unwrap_or_else(|| "lahore_temperature_predictor_random_forest".to_string()),

            model_stage: Stage::parse_preferred(
                &lookup("MODEL_STAGE").unwrap_or_else(|| "Production".to_string()),
            ),

            port: parse(lookup("PORT")).unwrap_or(8000),

            drift: DriftConfig {
                threshold_std: parse(lookup("DRIFT_THRESHOLD_STD"))
                    .filter(|k: &f64| k.is_finite() && *k > 0.0)
                    .unwrap_or(monitor::DEFAULT_THRESHOLD_STD),
                min_samples: parse(lookup("DRIFT_MIN_SAMPLES")).unwrap_or(monitor::DEFAULT_MIN_SAMPLES),
                suppress_constant: parse(lookup("DRIFT_SUPPRESS_CONSTANT")).unwrap_or(false),
            },

            log_json: lookup("LOG_FORMAT").map_or(false, |f| f.eq_ignore_ascii_case("json")),

            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
        }
    }

    pub fn model_source(&self) -> ModelSource {
        ModelSource {
            registry_uri: self.registry_uri.clone(),
            model_name: self.model_name.clone(),
            preferred_stage: self.model_stage,
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}
