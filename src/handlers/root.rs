//! Service info handler

use axum::{extract::State, Json};

use crate::models::{ServiceInfo, SERVICE_NAME};
use crate::AppState;

pub async fn info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: SERVICE_NAME.to_string(),
        model_loaded: state.model.is_loaded(),
        model_version: state.model.version_label(),
    })
}
