//! Prometheus exposition handler

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use crate::{AppResult, AppState};

pub async fn export(State(state): State<AppState>) -> AppResult<Response> {
    state.metrics.model_loaded.set(i64::from(state.model.is_loaded()));
    let body = state.metrics.render()?;

    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}
