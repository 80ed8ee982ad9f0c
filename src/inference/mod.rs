//! Inference Module - Model Holder
//!
//! Resolves one model from the registry at startup and serves predictions
//! from it for the lifetime of the process.
//!
//! # Architecture
//! - `registry.rs`: filesystem registry, stage and artifact resolution
//! - `artifact.rs`: `model.json` manifests and the `Regressor` implementations
//!
//! # Failure Strategy
//! Any resolution or load error leaves the holder `Unloaded`; the server keeps
//! running and prediction endpoints answer 503. Loading is never retried
//! automatically.

pub mod artifact;
pub mod registry;

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

pub use artifact::{InferenceError, LinearRegressor, Regressor};
pub use registry::{FileRegistry, RegistryError, Resolver, Stage};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model not loaded")]
    Unavailable,

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Where and what to load
#[derive(Debug, Clone)]
pub struct ModelSource {
    pub registry_uri: String,
    pub model_name: String,
    pub preferred_stage: Option<Stage>,
}

/// Immutable once built; shared read-only between requests.
pub struct LoadedModel {
    predictor: Box<dyn Regressor>,
    feature_names: Option<Vec<String>>,
    version: String,
}

impl LoadedModel {
    pub fn new(
        predictor: Box<dyn Regressor>,
        feature_names: Option<Vec<String>>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            predictor,
            feature_names,
            version: version.into(),
        }
    }

    /// Ordered feature names, `None` in advisory mode
    pub fn expected_features(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn predict(&self, row: &[f64]) -> Result<f64, InferenceError> {
        self.predictor.predict(row)
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("flavor", &self.predictor.flavor())
            .field("feature_names", &self.feature_names)
            .field("version", &self.version)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum ModelState {
    Loading,
    Unloaded { reason: String },
    Loaded(Arc<LoadedModel>),
}

// ============================================================================
// MODEL HOLDER
// ============================================================================

#[derive(Debug)]
pub struct ModelHolder {
    state: RwLock<ModelState>,
}

impl Default for ModelHolder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelHolder {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ModelState::Unloaded {
                reason: "load not started".to_string(),
            }),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ModelState {
        self.state.read().clone()
    }

    pub fn begin_loading(&self) {
        *self.state.write() = ModelState::Loading;
    }

    /// Resolve and load the configured model. On error the holder is left
    /// `Unloaded` and the error is returned for logging.
    pub fn load(&self, source: &ModelSource) -> Result<(), RegistryError> {
        tracing::info!(
            "Loading model '{}' from registry {}",
            source.model_name,
            source.registry_uri
        );

        match load_model(source) {
            Ok(model) => {
                tracing::info!(
                    "Model loaded successfully. Version: {}. Features: {}",
                    model.version(),
                    model
                        .expected_features()
                        .map(|f| f.len().to_string())
                        .unwrap_or_else(|| "unknown".to_string())
                );
                self.install(model);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Could not load model: {}", e);
                tracing::warn!("The API will start but /predict and /health return 503 until a model is deployed");
                *self.state.write() = ModelState::Unloaded { reason: e.to_string() };
                Err(e)
            }
        }
    }

    pub fn install(&self, model: LoadedModel) {
        *self.state.write() = ModelState::Loaded(Arc::new(model));
    }

    pub fn current(&self) -> Result<Arc<LoadedModel>, ModelError> {
        match &*self.state.read() {
            ModelState::Loaded(model) => Ok(Arc::clone(model)),
            ModelState::Loading | ModelState::Unloaded { .. } => Err(ModelError::Unavailable),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(&*self.state.read(), ModelState::Loaded(_))
    }

    /// Version label, `"N/A"` when nothing is loaded
    pub fn version_label(&self) -> String {
        self.current()
            .map(|m| m.version().to_string())
            .unwrap_or_else(|_| "N/A".to_string())
    }

    /// Score one ordered row. `Unavailable` unless a model is loaded.
    pub fn predict(&self, row: &[f64]) -> Result<f64, ModelError> {
        Ok(self.current()?.predict(row)?)
    }
}

fn load_model(source: &ModelSource) -> Result<LoadedModel, RegistryError> {
    let registry = FileRegistry::from_uri(&source.registry_uri)?;
    let resolver = Resolver::new(source.preferred_stage);

    tracing::debug!(
        "Resolving '{}' under {} (stages: {:?})",
        source.model_name,
        registry.root().display(),
        resolver.stages()
    );

    let resolved = resolver.resolve(&registry, &source.model_name)?;
    tracing::info!(
        "Resolved version {} (run: {}, created: {}) at {}",
        resolved.version.version,
        resolved.version.run_id.as_deref().unwrap_or("-"),
        resolved
            .version
            .creation_timestamp
            .map(|ts| ts.to_string())
            .unwrap_or_else(|| "-".to_string()),
        resolved.artifact_dir.display()
    );

    let artifact = artifact::load_artifact(&resolved.artifact_dir)?;

    Ok(LoadedModel::new(
        artifact.predictor,
        artifact.feature_names,
        resolved.version.label(),
    ))
}
