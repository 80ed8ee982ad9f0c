//! Model artifacts
//!
//! An artifact directory holds a `model.json` manifest tagged by `flavor`.
//! `onnx` artifacts point at a graph executed with ONNX Runtime; `linear`
//! and `tree_ensemble` artifacts carry their parameters inline.

use std::fs;
use std::path::Path;

use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;

use super::registry::RegistryError;

pub const MANIFEST_FILE: &str = "model.json";

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug, Error)]
#[error("InferenceError: {0}")]
pub struct InferenceError(pub String);

// ============================================================================
// REGRESSOR TRAIT
// ============================================================================

/// Single-output regression over one ordered feature row.
pub trait Regressor: Send + Sync {
    fn predict(&self, row: &[f64]) -> Result<f64, InferenceError>;
    fn flavor(&self) -> &'static str;
}

// ============================================================================
// MANIFEST
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "flavor", rename_all = "snake_case")]
pub enum ArtifactManifest {
    Onnx {
        model_file: String,
        feature_names: Option<Vec<String>>,
        n_features: Option<usize>,
    },
    Linear {
        intercept: f64,
        coefficients: Vec<f64>,
        feature_names: Option<Vec<String>>,
    },
    TreeEnsemble {
        trees: Vec<RegressionTree>,
        feature_names: Option<Vec<String>>,
        n_features: Option<usize>,
    },
}

impl ArtifactManifest {
    /// Ordered feature names when the artifact carries them, or synthetic
    /// `feature_{i}` names when only the width is known.
    pub fn feature_names(&self) -> Option<Vec<String>> {
        let (names, width) = match self {
            ArtifactManifest::Onnx { feature_names, n_features, .. } => (feature_names, *n_features),
            ArtifactManifest::Linear { feature_names, coefficients, .. } => {
                (feature_names, Some(coefficients.len()))
            }
            ArtifactManifest::TreeEnsemble { feature_names, n_features, .. } => {
                (feature_names, *n_features)
            }
        };

        names
            .clone()
            .or_else(|| width.map(|n| (0..n).map(|i| format!("feature_{}", i)).collect()))
    }

    /// Declared feature names must agree with the model's input width.
    fn validate(&self) -> Result<(), InferenceError> {
        let (names, width) = match self {
            ArtifactManifest::Onnx { feature_names, n_features, .. } => (feature_names, *n_features),
            ArtifactManifest::Linear { feature_names, coefficients, .. } => {
                (feature_names, Some(coefficients.len()))
            }
            ArtifactManifest::TreeEnsemble { feature_names, n_features, .. } => {
                (feature_names, *n_features)
            }
        };

        match (names, width) {
            (Some(names), Some(width)) if names.len() != width => Err(InferenceError(format!(
                "artifact declares {} feature names for {} inputs",
                names.len(),
                width
            ))),
            _ => Ok(()),
        }
    }
}

/// Predictor plus whatever feature metadata the artifact exposed
pub struct LoadedArtifact {
    pub predictor: Box<dyn Regressor>,
    pub feature_names: Option<Vec<String>>,
}

/// Read `model.json` from `dir` and build the predictor it describes.
pub fn load_artifact(dir: &Path) -> Result<LoadedArtifact, RegistryError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let data = fs::read(&manifest_path).map_err(|source| RegistryError::Io {
        path: manifest_path.clone(),
        source,
    })?;
    let manifest: ArtifactManifest =
        serde_json::from_slice(&data).map_err(|source| RegistryError::Metadata {
            path: manifest_path.clone(),
            source,
        })?;

    manifest.validate()?;
    let feature_names = manifest.feature_names();

    let predictor: Box<dyn Regressor> = match manifest {
        ArtifactManifest::Onnx { model_file, .. } => {
            Box::new(OnnxRegressor::load(&dir.join(model_file))?)
        }
        ArtifactManifest::Linear { intercept, coefficients, .. } => {
            Box::new(LinearRegressor::new(intercept, coefficients))
        }
        ArtifactManifest::TreeEnsemble { trees, .. } => Box::new(TreeEnsembleRegressor::new(trees)?),
    };

    if let Some(names) = &feature_names {
        if names.is_empty() {
            return Err(InferenceError("artifact declares an empty feature list".into()).into());
        }
    }

    Ok(LoadedArtifact {
        predictor,
        feature_names,
    })
}

// ============================================================================
// ONNX IMPLEMENTATION
// ============================================================================

pub struct OnnxRegressor {
    // Session::run needs exclusive access
    session: Mutex<Session>,
    output_name: String,
}

impl OnnxRegressor {
    pub fn load(model_path: &Path) -> Result<Self, InferenceError> {
        tracing::info!("Loading ONNX model from: {}", model_path.display());

        if !model_path.exists() {
            return Err(InferenceError(format!("Model not found: {}", model_path.display())));
        }

        let session = Session::builder()
            .map_err(|e| InferenceError(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| InferenceError(format!("Failed to set optimization: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| InferenceError(format!("Failed to load model: {}", e)))?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| InferenceError("No output defined".to_string()))?;

        Ok(Self {
            session: Mutex::new(session),
            output_name,
        })
    }
}

impl Regressor for OnnxRegressor {
    fn predict(&self, row: &[f64]) -> Result<f64, InferenceError> {
        let input: Vec<f32> = row.iter().map(|v| *v as f32).collect();
        let input_array = Array2::<f32>::from_shape_vec((1, row.len()), input)
            .map_err(|e| InferenceError(format!("Array error: {}", e)))?;

        let input_tensor = Value::from_array(input_array)
            .map_err(|e| InferenceError(format!("Tensor error: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| InferenceError(format!("Inference failed: {}", e)))?;

        let output = outputs
            .get(&self.output_name)
            .ok_or_else(|| InferenceError("No output".to_string()))?;

        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError(format!("Extract error: {}", e)))?;

        data.first()
            .map(|v| *v as f64)
            .ok_or_else(|| InferenceError("Empty output tensor".to_string()))
    }

    fn flavor(&self) -> &'static str {
        "onnx"
    }
}

// ============================================================================
// LINEAR
// ============================================================================

#[derive(Debug, Clone)]
pub struct LinearRegressor {
    intercept: f64,
    coefficients: Vec<f64>,
}

impl LinearRegressor {
    pub fn new(intercept: f64, coefficients: Vec<f64>) -> Self {
        Self {
            intercept,
            coefficients,
        }
    }
}

impl Regressor for LinearRegressor {
    fn predict(&self, row: &[f64]) -> Result<f64, InferenceError> {
        if row.len() != self.coefficients.len() {
            return Err(InferenceError(format!(
                "expected {} features, got {}",
                self.coefficients.len(),
                row.len()
            )));
        }

        Ok(self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(c, x)| c * x)
                .sum::<f64>())
    }

    fn flavor(&self) -> &'static str {
        "linear"
    }
}

// ============================================================================
// TREE ENSEMBLE (random forest regressor)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    /// Goes left when `row[feature] <= threshold`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn validate(&self) -> Result<(), InferenceError> {
        if self.nodes.is_empty() {
            return Err(InferenceError("tree has no nodes".into()));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split { left, right, .. } = node {
                // Children must come after their parent, which also rules out cycles.
                if *left <= idx || *right <= idx || *left >= self.nodes.len() || *right >= self.nodes.len() {
                    return Err(InferenceError(format!("node {} has invalid children", idx)));
                }
            }
        }
        Ok(())
    }

    /// Widest feature index referenced plus one
    fn width(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                TreeNode::Split { feature, .. } => Some(feature + 1),
                TreeNode::Leaf { .. } => None,
            })
            .max()
            .unwrap_or(0)
    }

    fn evaluate(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split { feature, threshold, left, right } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TreeEnsembleRegressor {
    trees: Vec<RegressionTree>,
    width: usize,
}

impl TreeEnsembleRegressor {
    pub fn new(trees: Vec<RegressionTree>) -> Result<Self, InferenceError> {
        if trees.is_empty() {
            return Err(InferenceError("ensemble has no trees".into()));
        }
        for tree in &trees {
            tree.validate()?;
        }
        let width = trees.iter().map(RegressionTree::width).max().unwrap_or(0);

        Ok(Self { trees, width })
    }
}

impl Regressor for TreeEnsembleRegressor {
    fn predict(&self, row: &[f64]) -> Result<f64, InferenceError> {
        if row.len() < self.width {
            return Err(InferenceError(format!(
                "expected at least {} features, got {}",
                self.width,
                row.len()
            )));
        }

        let total: f64 = self.trees.iter().map(|tree| tree.evaluate(row)).sum();
        Ok(total / self.trees.len() as f64)
    }

    fn flavor(&self) -> &'static str {
        "tree_ensemble"
    }
}
