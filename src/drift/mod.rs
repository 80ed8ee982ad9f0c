//! Drift Module - online data-drift detection for prediction inputs
//!
//! # Architecture
//! - `stats.rs`: `FeatureStats`, Welford running mean/variance
//! - `monitor.rs`: `DriftMonitor` store + classify/update policy
//!
//! Nothing here is persisted; statistics start empty on every process start.

pub mod stats;
pub mod monitor;

pub use monitor::{DriftConfig, DriftMonitor, DriftSnapshot, DriftVerdict};
