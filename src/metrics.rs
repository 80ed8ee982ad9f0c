//! Prometheus metrics
//!
//! Each application instance owns its own `Registry` so that independent
//! routers (tests in particular) never share counters.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

pub struct Metrics {
    registry: Registry,
    pub requests: IntCounterVec,
    pub latency: Histogram,
    pub drift_ratio: Histogram,
    pub drift_detected: IntCounterVec,
    pub model_loaded: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("prediction_requests_total", "Total prediction requests"),
            &["status"],
        )?;

        let latency = Histogram::with_opts(HistogramOpts::new(
            "prediction_latency_seconds",
            "Prediction latency",
        ))?;

        let drift_ratio = Histogram::with_opts(
            HistogramOpts::new(
                "prediction_drift_ratio",
                "Fraction of expected features flagged as drifting per request",
            )
            .buckets(vec![0.0, 0.05, 0.1, 0.2, 0.3, 0.5, 0.75, 1.0]),
        )?;

        let drift_detected = IntCounterVec::new(
            Opts::new(
                "prediction_drift_detected_total",
                "Requests in which a feature was flagged as drifting",
            ),
            &["feature"],
        )?;

        let model_loaded = IntGauge::new("model_loaded", "1 when a model is loaded, 0 otherwise")?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(drift_ratio.clone()))?;
        registry.register(Box::new(drift_detected.clone()))?;
        registry.register(Box::new(model_loaded.clone()))?;

        Ok(Self {
            registry,
            requests,
            latency,
            drift_ratio,
            drift_detected,
            model_loaded,
        })
    }

    pub fn record_request(&self, success: bool, latency_secs: f64) {
        let status = if success { STATUS_SUCCESS } else { STATUS_ERROR };
        self.requests.with_label_values(&[status]).inc();
        self.latency.observe(latency_secs);
    }

    pub fn record_drift<'a>(&self, ratio: f64, offending: impl IntoIterator<Item = &'a String>) {
        self.drift_ratio.observe(ratio);
        for feature in offending {
            self.drift_detected.with_label_values(&[feature.as_str()]).inc();
        }
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_families() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request(true, 0.01);
        metrics.record_request(false, 0.02);
        metrics.record_drift(0.5, &["temp".to_string()]);

        let text = metrics.render().unwrap();
        assert!(text.contains(r#"prediction_requests_total{status="success"} 1"#));
        assert!(text.contains(r#"prediction_requests_total{status="error"} 1"#));
        assert!(text.contains("prediction_latency_seconds_count 2"));
        assert!(text.contains("prediction_drift_ratio_count 1"));
        assert!(text.contains(r#"prediction_drift_detected_total{feature="temp"} 1"#));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_request(true, 0.0);

        assert_eq!(a.requests.with_label_values(&[STATUS_SUCCESS]).get(), 1);
        assert_eq!(b.requests.with_label_values(&[STATUS_SUCCESS]).get(), 0);
    }
}
