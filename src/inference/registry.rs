//! Filesystem model registry
//!
//! Layout follows the MLflow file store, with JSON metadata:
//!
//! ```text
//! <root>/models/<name>/version-<n>/meta.json
//! <root>/<experiment>/models/<model_id>/artifacts/model.json
//! ```
//!
//! Resolution is an ordered list of strategies. Stages are tried first
//! (configured stage, then the fixed fallback list), then artifact
//! locations (the version's `source`, then a scan of experiment folders).
//! The first strategy that succeeds wins.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use super::artifact::{InferenceError, MANIFEST_FILE};

/// Stages tried, in order, once the configured stage has no versions.
pub const FALLBACK_STAGES: [Stage; 3] = [Stage::Unassigned, Stage::Staging, Stage::Production];

const MODELS_DIR: &str = "models";
const VERSION_PREFIX: &str = "version-";
const VERSION_META: &str = "meta.json";
const ARTIFACTS_DIR: &str = "artifacts";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unsupported registry URI scheme: {0}")]
    UnsupportedScheme(String),

    #[error("model {0} not found in registry")]
    ModelNotFound(String),

    #[error("model {name} has no version in stages {stages}")]
    NoMatchingVersion { name: String, stages: String },

    #[error("no artifact found for {name} version {version}")]
    ArtifactNotFound { name: String, version: u32 },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid metadata in {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

// ============================================================================
// STAGES & VERSIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Stage {
    #[serde(rename = "None")]
    Unassigned,
    Staging,
    Production,
    Archived,
}

impl Stage {
    /// Parse a configured stage name. `"None"` and blank mean no preference.
    pub fn parse_preferred(raw: &str) -> Option<Stage> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "staging" => Some(Stage::Staging),
            "production" => Some(Stage::Production),
            "archived" => Some(Stage::Archived),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Unassigned => "None",
            Stage::Staging => "Staging",
            Stage::Production => "Production",
            Stage::Archived => "Archived",
        };
        f.write_str(name)
    }
}

/// `meta.json` of one registered version
#[derive(Debug, Clone, Deserialize)]
pub struct ModelVersion {
    pub version: u32,
    pub current_stage: Option<Stage>,
    /// Artifact location: `file:` URI, absolute path, or path relative to the registry root
    pub source: Option<String>,
    pub run_id: Option<String>,
    pub creation_timestamp: Option<i64>,
}

impl ModelVersion {
    pub fn stage(&self) -> Stage {
        self.current_stage.unwrap_or(Stage::Unassigned)
    }

    /// Human-readable label, e.g. `3 (Stage: Production)`
    pub fn label(&self) -> String {
        format!("{} (Stage: {})", self.version, self.stage())
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Debug, Clone)]
pub struct FileRegistry {
    root: PathBuf,
}

impl FileRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Accepts `file:<path>`, `file://<path>` or a bare path.
    pub fn from_uri(uri: &str) -> Result<Self, RegistryError> {
        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(Self::new(path));
        }
        if let Some(path) = uri.strip_prefix("file:") {
            return Ok(Self::new(path));
        }
        if let Some((scheme, _)) = uri.split_once("://") {
            return Err(RegistryError::UnsupportedScheme(scheme.to_string()));
        }
        Ok(Self::new(uri))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All registered versions of `name`, unordered.
    pub fn versions(&self, name: &str) -> Result<Vec<ModelVersion>, RegistryError> {
        let model_dir = self.root.join(MODELS_DIR).join(name);
        if !model_dir.is_dir() {
            return Err(RegistryError::ModelNotFound(name.to_string()));
        }

        let entries = fs::read_dir(&model_dir).map_err(|source| RegistryError::Io {
            path: model_dir.clone(),
            source,
        })?;

        let mut versions = Vec::new();
        for entry in entries.flatten() {
            let dir_name = entry.file_name();
            if !dir_name.to_string_lossy().starts_with(VERSION_PREFIX) {
                continue;
            }

            let meta_path = entry.path().join(VERSION_META);
            let data = match fs::read(&meta_path) {
                Ok(data) => data,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!("Skipping {}: no {}", entry.path().display(), VERSION_META);
                    continue;
                }
                Err(source) => return Err(RegistryError::Io { path: meta_path, source }),
            };

            let version: ModelVersion = serde_json::from_slice(&data)
                .map_err(|source| RegistryError::Metadata { path: meta_path, source })?;
            versions.push(version);
        }

        Ok(versions)
    }

    /// Highest version of `name` currently in `stage`.
    pub fn latest_version(&self, name: &str, stage: Stage) -> Result<Option<ModelVersion>, RegistryError> {
        Ok(self
            .versions(name)?
            .into_iter()
            .filter(|v| v.stage() == stage)
            .max_by_key(|v| v.version))
    }

    fn resolve_source(&self, source: &str) -> PathBuf {
        let raw = source
            .strip_prefix("file://")
            .or_else(|| source.strip_prefix("file:"))
            .unwrap_or(source);
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// `<root>/*/models/*/artifacts` directories containing a manifest,
    /// in sorted order.
    fn scan_artifact_dirs(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();

        for experiment in sorted_subdirs(&self.root) {
            // The registry's own metadata tree is not an experiment.
            if experiment.file_name().map_or(false, |n| n == MODELS_DIR) {
                continue;
            }
            for model in sorted_subdirs(&experiment.join(MODELS_DIR)) {
                let artifacts = model.join(ARTIFACTS_DIR);
                if artifacts.join(MANIFEST_FILE).is_file() {
                    found.push(artifacts);
                }
            }
        }

        found
    }
}

fn sorted_subdirs(dir: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect(),
        Err(_) => Vec::new(),
    };
    dirs.sort();
    dirs
}

// ============================================================================
// RESOLUTION STRATEGIES
// ============================================================================

/// Where to look for a version's artifact directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactLocator {
    /// The `source` recorded on the version
    VersionSource,
    /// First `<root>/*/models/*/artifacts` holding a manifest
    ExperimentScan,
}

impl ArtifactLocator {
    fn locate(&self, registry: &FileRegistry, version: &ModelVersion) -> Option<PathBuf> {
        match self {
            ArtifactLocator::VersionSource => version
                .source
                .as_deref()
                .map(|s| registry.resolve_source(s))
                .filter(|dir| dir.join(MANIFEST_FILE).is_file()),
            ArtifactLocator::ExperimentScan => registry.scan_artifact_dirs().into_iter().next(),
        }
    }
}

/// A version together with the artifact directory it resolved to
#[derive(Debug, Clone)]
pub struct Resolved {
    pub version: ModelVersion,
    pub artifact_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Resolver {
    stages: Vec<Stage>,
    locators: Vec<ArtifactLocator>,
}

impl Resolver {
    /// Preferred stage first (if any), then [`FALLBACK_STAGES`].
    pub fn new(preferred: Option<Stage>) -> Self {
        let mut stages: Vec<Stage> = preferred.into_iter().collect();
        for stage in FALLBACK_STAGES {
            if !stages.contains(&stage) {
                stages.push(stage);
            }
        }

        Self {
            stages,
            locators: vec![ArtifactLocator::VersionSource, ArtifactLocator::ExperimentScan],
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn resolve(&self, registry: &FileRegistry, name: &str) -> Result<Resolved, RegistryError> {
        let version = self.resolve_version(registry, name)?;

        for locator in &self.locators {
            if let Some(artifact_dir) = locator.locate(registry, &version) {
                tracing::debug!("Artifact located via {:?}: {}", locator, artifact_dir.display());
                return Ok(Resolved { version, artifact_dir });
            }
            tracing::debug!("Locator {:?} found nothing for {} v{}", locator, name, version.version);
        }

        Err(RegistryError::ArtifactNotFound {
            name: name.to_string(),
            version: version.version,
        })
    }

    fn resolve_version(&self, registry: &FileRegistry, name: &str) -> Result<ModelVersion, RegistryError> {
        for stage in &self.stages {
            if let Some(version) = registry.latest_version(name, *stage)? {
                return Ok(version);
            }
        }

        let stages = self
            .stages
            .iter()
            .map(Stage::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        Err(RegistryError::NoMatchingVersion {
            name: name.to_string(),
            stages,
        })
    }
}
