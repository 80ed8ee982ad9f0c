use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::config::Config;
use crate::features::FeatureVector;
use crate::inference::{LinearRegressor, LoadedModel};
use crate::metrics::{STATUS_ERROR, STATUS_SUCCESS};
use crate::{create_router, pipeline, AppError, AppState};

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn empty_state() -> AppState {
    AppState::new(&Config::from_lookup(|_| None)).unwrap()
}

/// State with a linear model installed. `features = None` puts the model in
/// advisory mode.
fn state_with_model(features: Option<&[&str]>, coefficients: Vec<f64>) -> AppState {
    let state = empty_state();
    state.model.install(LoadedModel::new(
        Box::new(LinearRegressor::new(1.0, coefficients)),
        features.map(names),
        "7 (Stage: Production)",
    ));
    state
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn post_predict(app: &Router, body: Value) -> (StatusCode, Value) {
    post_predict_raw(app, body.to_string()).await
}

/// `json!` sorts object keys, so key order on the wire needs a raw body.
async fn post_predict_raw(app: &Router, body: impl Into<String>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.into()))
        .unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

// ============================================================================
// MODEL UNAVAILABLE
// ============================================================================

#[tokio::test]
async fn test_root_without_model() {
    let app = create_router(empty_state());

    let (status, body) = get_json(&app, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["service"].is_string());
    assert_eq!(body["model_loaded"], json!(false));
    assert_eq!(body["model_version"], json!("N/A"));
}

#[tokio::test]
async fn test_health_without_model_is_503() {
    let app = create_router(empty_state());

    let (status, body) = get_json(&app, "/health").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], json!(503));
}

#[tokio::test]
async fn test_predict_without_model_is_503() {
    let state = empty_state();
    let app = create_router(state.clone());

    let (status, _) = post_predict(&app, json!({ "features": { "temp": 20.0 } })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = post_predict(&app, json!({ "features": {} })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    assert_eq!(state.metrics.requests.with_label_values(&[STATUS_ERROR]).get(), 2);
    assert!(state.drift.lock().is_empty());
}

#[tokio::test]
async fn test_predict_while_loading_is_503() {
    let state = empty_state();
    state.model.begin_loading();
    let app = create_router(state);

    let (status, _) = post_predict(&app, json!({ "features": { "temp": 20.0 } })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// ============================================================================
// MODEL LOADED
// ============================================================================

#[tokio::test]
async fn test_health_with_model() {
    let app = create_router(state_with_model(Some(&["temp", "humidity"]), vec![1.0, 1.0]));

    let (status, body) = get_json(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["model_version"], json!("7 (Stage: Production)"));
    assert!(chrono::DateTime::parse_from_rfc3339(body["timestamp"].as_str().unwrap()).is_ok());

    let (_, info) = get_json(&app, "/").await;
    assert_eq!(info["model_loaded"], json!(true));
}

#[tokio::test]
async fn test_missing_feature_is_400_and_named() {
    let state = state_with_model(Some(&["temp", "humidity"]), vec![1.0, 1.0]);
    let app = create_router(state.clone());

    let (status, body) = post_predict(&app, json!({ "features": { "temp": 20 } })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["missing"], json!(["humidity"]));
    assert!(body["error"].as_str().unwrap().contains("humidity"));
    // Incomplete requests never reach the statistics.
    assert!(state.drift.lock().is_empty());
}

#[tokio::test]
async fn test_predict_reorders_features() {
    let state = state_with_model(Some(&["temp", "humidity"]), vec![2.0, -10.0]);
    let app = create_router(state.clone());

    let (status, body) = post_predict(
        &app,
        json!({ "features": { "humidity": 0.5, "wind": 12.0, "temp": 30.0 } }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"], json!(1.0 + 60.0 - 5.0));
    assert_eq!(body["model_version"], json!("7 (Stage: Production)"));
    assert!(body["timestamp"].is_string());
    assert!(body.get("ratio").is_none());

    let monitor = state.drift.lock();
    assert!(monitor.stats("wind").is_none());
    assert_eq!(monitor.stats("temp").unwrap().count, 1);
    drop(monitor);

    assert_eq!(state.metrics.requests.with_label_values(&[STATUS_SUCCESS]).get(), 1);
    assert_eq!(state.metrics.latency.get_sample_count(), 1);
}

#[tokio::test]
async fn test_advisory_mode_passes_supplied_order() {
    let state = state_with_model(None, vec![1.0, 10.0]);
    let app = create_router(state);

    let (status, body) = post_predict_raw(&app, r#"{"features": {"b": 1.0, "a": 2.0}}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"], json!(1.0 + 1.0 + 20.0));

    let (status, body) = post_predict_raw(&app, r#"{"features": {"a": 2.0, "b": 1.0}}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"], json!(1.0 + 2.0 + 10.0));
}

#[tokio::test]
async fn test_inference_failure_is_500_and_counted() {
    let state = state_with_model(None, vec![1.0, 1.0]);
    let app = create_router(state.clone());

    let (status, body) = post_predict(&app, json!({ "features": { "only_one": 1.0 } })).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], json!(500));
    assert_eq!(state.metrics.requests.with_label_values(&[STATUS_ERROR]).get(), 1);
    assert_eq!(state.metrics.latency.get_sample_count(), 1);
}

#[tokio::test]
async fn test_malformed_body_is_client_error() {
    let app = create_router(state_with_model(Some(&["temp"]), vec![1.0]));

    let (status, _) = post_predict(&app, json!({ "features": { "temp": "warm" } })).await;
    assert!(status.is_client_error());

    let (status, _) = post_predict(&app, json!({ "inputs": [1, 2] })).await;
    assert!(status.is_client_error());
}

// ============================================================================
// DRIFT
// ============================================================================

#[tokio::test]
async fn test_single_divergent_feature_after_warm_history() {
    let features = ["temp", "humidity", "pressure"];
    let state = state_with_model(Some(&features[..]), vec![1.0, 1.0, 1.0]);
    let app = create_router(state.clone());

    let normal = json!({ "features": { "temp": 24.0, "humidity": 0.55, "pressure": 1009.0 } });
    for _ in 0..50 {
        let (status, _) = post_predict(&app, normal.clone()).await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(state.metrics.drift_ratio.get_sample_sum(), 0.0);

    let divergent = json!({ "features": { "temp": 400.0, "humidity": 0.55, "pressure": 1009.0 } });
    let (status, _) = post_predict(&app, divergent).await;
    assert_eq!(status, StatusCode::OK);

    let detected = |name: &str| state.metrics.drift_detected.with_label_values(&[name]).get();
    assert_eq!(detected("temp"), 1);
    assert_eq!(detected("humidity"), 0);
    assert_eq!(detected("pressure"), 0);

    assert_eq!(state.metrics.drift_ratio.get_sample_count(), 51);
    let ratio = state.metrics.drift_ratio.get_sample_sum();
    assert!((ratio - 1.0 / features.len() as f64).abs() < 1e-12);
}

#[tokio::test]
async fn test_pipeline_reports_verdict() {
    let state = state_with_model(Some(&["temp", "humidity"]), vec![1.0, 1.0]);
    let vector = |t: f64| -> FeatureVector { [("temp", t), ("humidity", 0.5)].into_iter().collect() };

    let first = pipeline::run(&state, vector(20.0)).await.unwrap();
    assert!(!first.verdict.flagged);
    assert_eq!(first.verdict.ratio, 0.0);

    for t in [21.0, 19.0, 20.5, 19.5] {
        pipeline::run(&state, vector(t)).await.unwrap();
    }

    let outcome = pipeline::run(&state, vector(90.0)).await.unwrap();
    assert!(outcome.verdict.flagged);
    assert_eq!(outcome.verdict.offending_features.len(), 1);
    assert!(outcome.verdict.offending_features.contains("temp"));
    assert_eq!(outcome.verdict.ratio, 0.5);
    assert_eq!(outcome.prediction, 1.0 + 90.0 + 0.5);
}

#[tokio::test]
async fn test_pipeline_missing_features_error() {
    let state = state_with_model(Some(&["temp", "humidity", "pressure"]), vec![1.0; 3]);
    let vector: FeatureVector = [("humidity", 0.5)].into_iter().collect();

    match pipeline::run(&state, vector).await {
        Err(AppError::MissingFeatures(missing)) => {
            assert_eq!(missing, names(&["temp", "pressure"]))
        }
        other => panic!("expected MissingFeatures, got {:?}", other.map(|o| o.prediction)),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_do_not_lose_updates() {
    let state = state_with_model(Some(&["temp"]), vec![1.0]);

    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let state = state.clone();
            tokio::spawn(async move {
                let vector: FeatureVector = [("temp", i as f64)].into_iter().collect();
                pipeline::run(&state, vector).await.map(|_| ())
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let monitor = state.drift.lock();
    let stats = monitor.stats("temp").unwrap();
    assert_eq!(stats.count, 64);
    assert!((stats.mean - 31.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_drift_endpoint_snapshot() {
    let state = state_with_model(Some(&["temp", "humidity"]), vec![1.0, 1.0]);
    let app = create_router(state);

    let (status, body) = get_json(&app, "/drift").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["features"], json!({}));
    assert_eq!(body["cold_start"], json!(true));

    post_predict(&app, json!({ "features": { "temp": 10.0, "humidity": 0.2 } })).await;
    post_predict(&app, json!({ "features": { "temp": 14.0, "humidity": 0.2 } })).await;

    let (_, body) = get_json(&app, "/drift").await;
    assert_eq!(body["cold_start"], json!(false));
    assert_eq!(body["features"]["temp"]["count"], json!(2));
    assert_eq!(body["features"]["temp"]["mean"], json!(12.0));
    assert_eq!(body["threshold_std"], json!(3.0));
    assert_eq!(body["min_samples"], json!(1));
}

// ============================================================================
// METRICS
// ============================================================================

#[tokio::test]
async fn test_metrics_endpoint() {
    let state = state_with_model(Some(&["temp"]), vec![1.0]);
    let app = create_router(state);
    post_predict(&app, json!({ "features": { "temp": 20.0 } })).await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains(r#"prediction_requests_total{status="success"} 1"#));
    assert!(text.contains("prediction_latency_seconds_bucket"));
    assert!(text.contains("prediction_drift_ratio_count 1"));
    assert!(text.contains("model_loaded 1"));
}

#[tokio::test]
async fn test_metrics_endpoint_without_model() {
    let app = create_router(empty_state());

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("model_loaded 0"));
}
