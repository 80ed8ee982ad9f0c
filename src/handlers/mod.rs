//! HTTP handlers

pub mod root;
pub mod health;
pub mod predict;
pub mod metrics;
pub mod drift;
#[cfg(test)]
mod tests;
