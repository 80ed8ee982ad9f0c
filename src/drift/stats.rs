//! Running per-feature statistics (Welford)

use serde::Serialize;

/// `std` reported while fewer than two samples have been seen.
pub const DEFAULT_STD: f64 = 1.0;

/// Largest accepted magnitude. Squared deviations of values within this bound
/// stay far below `f64::MAX`, so `m2` cannot overflow.
pub const MAX_MAGNITUDE: f64 = 1e150;

/// Online mean/variance for one feature.
///
/// Only `count`, `mean` and `m2` are state; `std` is recomputed after every
/// push and never set directly. Memory use is constant in the number of
/// observations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureStats {
    pub count: u64,
    pub mean: f64,
    /// Sum of squared deviations from the running mean
    pub m2: f64,
    pub std: f64,
}

impl Default for FeatureStats {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureStats {
    pub const fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            std: DEFAULT_STD,
        }
    }

    /// Fold one observation in, O(1).
    ///
    /// Returns `false` and leaves the statistics untouched when the value is
    /// beyond [`MAX_MAGNITUDE`] or the update would not stay finite.
    pub fn push(&mut self, value: f64) -> bool {
        if !value.is_finite() || value.abs() > MAX_MAGNITUDE {
            return false;
        }

        let count = self.count + 1;
        let delta = value - self.mean;
        let mean = self.mean + delta / count as f64;
        let delta2 = value - mean;
        // delta and delta2 always share a sign, so m2 never decreases.
        let m2 = self.m2 + delta * delta2;
        if !(mean.is_finite() && m2.is_finite()) {
            return false;
        }

        self.count = count;
        self.mean = mean;
        self.m2 = m2;
        self.std = if count > 1 {
            (m2 / (count - 1) as f64).sqrt()
        } else {
            DEFAULT_STD
        };
        true
    }

    /// Absolute distance from the running mean in units of `std`.
    /// `None` for a constant feature (`std == 0`).
    pub fn z_score(&self, value: f64) -> Option<f64> {
        if self.std > 0.0 {
            Some((value - self.mean).abs() / self.std)
        } else {
            None
        }
    }
}
