//! Temperature Prediction Server
//!
//! Serves predictions from one registered regression model and watches the
//! incoming feature distribution for drift.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  TEMPERATURE PREDICTION API                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌──────────────────┐  ┌──────────────────┐  │
//! │  │  HTTP     │  │  Pipeline        │  │  Drift Monitor   │  │
//! │  │  (Axum)   │─▶│  validate/order  │─▶│  (Welford stats) │  │
//! │  └───────────┘  └────────┬─────────┘  └──────────────────┘  │
//! │                          ▼                                  │
//! │                 ┌─────────────────┐   ┌──────────────────┐  │
//! │                 │  Model Holder   │◀──│  File Registry   │  │
//! │                 └─────────────────┘   └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod drift;
mod error;
mod features;
mod handlers;
mod inference;
mod metrics;
mod models;
mod pipeline;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::{get, post}, Router};
use parking_lot::Mutex;
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    // Initialize logging
    init_tracing(&config);

    tracing::info!("Temperature Prediction Server starting ({})...", config.environment);
    tracing::info!(
        "Registry: {}, model: {}, stage: {}",
        config.registry_uri,
        config.model_name,
        config
            .model_stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| "any".to_string())
    );

    // Build application state
    let state = AppState::new(&config)
        .map_err(|e| anyhow::anyhow!("Failed to register metrics: {}", e))?;

    // Load the model in the background; requests are admitted immediately
    // and get 503 until it is ready.
    state.model.begin_loading();
    let holder = Arc::clone(&state.model);
    let source = config.model_source();
    tokio::task::spawn_blocking(move || {
        // Failure already logged and recorded in the holder state.
        let _ = holder.load(&source);
    });

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(config: &config::Config) {
    let default_filter = if config.is_production() {
        "temp_predict_server=info,tower_http=info"
    } else {
        "temp_predict_server=debug,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<inference::ModelHolder>,
    /// One lock covers classify + update for a request
    pub drift: Arc<Mutex<drift::DriftMonitor>>,
    pub metrics: Arc<metrics::Metrics>,
}

impl AppState {
    pub fn new(config: &config::Config) -> Result<Self, prometheus::Error> {
        Ok(Self {
            model: Arc::new(inference::ModelHolder::new()),
            drift: Arc::new(Mutex::new(drift::DriftMonitor::new(config.drift))),
            metrics: Arc::new(metrics::Metrics::new()?),
        })
    }
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root::info))
        .route("/health", get(handlers::health::check))
        .route("/predict", post(handlers::predict::predict))
        .route("/metrics", get(handlers::metrics::export))
        .route("/drift", get(handlers::drift::stats))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
