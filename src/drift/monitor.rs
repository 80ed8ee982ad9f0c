//! Drift Monitor - online out-of-distribution check for prediction inputs
//!
//! Each request is first classified against the statistics accumulated from
//! earlier requests, then folded into those statistics. A request therefore
//! never counts against itself.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use super::stats::FeatureStats;
use crate::features::FeatureVector;

// ============================================================================
// CONSTANTS
// ============================================================================

pub const DEFAULT_THRESHOLD_STD: f64 = 3.0;
pub const DEFAULT_MIN_SAMPLES: u64 = 1;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftConfig {
    /// A value further than `threshold_std * std` from the mean is drift
    pub threshold_std: f64,

    /// Minimum observations before a feature is classified at all
    pub min_samples: u64,

    /// Never flag features whose running std is exactly zero.
    ///
    /// Off by default, which departs from the usual rule that a constant
    /// feature never drifts: with it on, a feature that has only ever seen
    /// one value could not flag the first value that differs.
    pub suppress_constant: bool,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            threshold_std: DEFAULT_THRESHOLD_STD,
            min_samples: DEFAULT_MIN_SAMPLES,
            suppress_constant: false,
        }
    }
}

// ============================================================================
// VERDICT
// ============================================================================

/// Per-request drift classification. Reported through metrics, never stored.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DriftVerdict {
    pub flagged: bool,
    pub offending_features: BTreeSet<String>,
    /// offending / expected, in [0, 1]
    pub ratio: f64,
}

impl DriftVerdict {
    /// Nothing to compare against yet.
    pub fn cold() -> Self {
        Self::default()
    }
}

/// Read-only copy of the statistics store
#[derive(Debug, Clone, Serialize)]
pub struct DriftSnapshot {
    pub features: BTreeMap<String, FeatureStats>,
}

// ============================================================================
// DRIFT MONITOR
// ============================================================================

/// Statistics store plus classification policy.
///
/// The monitor is a plain value; callers that share it between requests
/// must hold one lock across [`DriftMonitor::observe`] (or across a
/// `classify` + `update` pair) so concurrent Welford updates never
/// interleave.
#[derive(Debug, Clone, Default)]
pub struct DriftMonitor {
    config: DriftConfig,
    stats: HashMap<String, FeatureStats>,
}

impl DriftMonitor {
    pub fn new(config: DriftConfig) -> Self {
        Self {
            config,
            stats: HashMap::new(),
        }
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    #[cfg(test)]
    pub fn stats(&self, feature: &str) -> Option<&FeatureStats> {
        self.stats.get(feature)
    }

    /// Classify `vector` against current statistics. Does not mutate.
    pub fn classify(&self, expected: &[String], vector: &FeatureVector) -> DriftVerdict {
        if self.stats.is_empty() {
            return DriftVerdict::cold();
        }

        // count >= 1 is required regardless of config: a zeroed entry has no mean.
        let min_samples = self.config.min_samples.max(1);

        let offending: BTreeSet<String> = expected
            .iter()
            .filter_map(|name| {
                let value = vector.get(name)?;
                let stats = self.stats.get(name)?;
                if stats.count < min_samples {
                    return None;
                }
                self.is_outlier(stats, value).then(|| name.clone())
            })
            .collect();

        let ratio = if expected.is_empty() {
            0.0
        } else {
            offending.len() as f64 / expected.len() as f64
        };

        DriftVerdict {
            flagged: !offending.is_empty(),
            offending_features: offending,
            ratio,
        }
    }

    /// Fold `vector` into the running statistics.
    ///
    /// The first update after startup creates a zeroed entry for every
    /// expected feature. Names outside `expected` never enter the store.
    pub fn update(&mut self, expected: &[String], vector: &FeatureVector) {
        if self.stats.is_empty() {
            for name in expected {
                self.stats.insert(name.clone(), FeatureStats::new());
            }
        }

        for name in expected {
            if let Some(value) = vector.get(name) {
                if !self.stats.entry(name.clone()).or_default().push(value) {
                    tracing::warn!("Skipping out-of-range value {} for feature '{}'", value, name);
                }
            }
        }
    }

    /// Classify then update, in that order.
    pub fn observe(&mut self, expected: &[String], vector: &FeatureVector) -> DriftVerdict {
        let verdict = self.classify(expected, vector);
        self.update(expected, vector);
        verdict
    }

    pub fn snapshot(&self) -> DriftSnapshot {
        DriftSnapshot {
            features: self
                .stats
                .iter()
                .map(|(name, stats)| (name.clone(), *stats))
                .collect(),
        }
    }

    fn is_outlier(&self, stats: &FeatureStats, value: f64) -> bool {
        match stats.z_score(value) {
            Some(z) => z > self.config.threshold_std,
            // Constant feature: any deviation at all is outside k * 0.
            None => !self.config.suppress_constant && value != stats.mean,
        }
    }
}
