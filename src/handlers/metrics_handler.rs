use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};

use super::AppState;
use crate::config::ScrapeMode;
use crate::error::AppError;

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Handle the metrics endpoint
///
/// In on-demand mode the pull waits for a scrape cycle first; pulls that
/// overlap an in-flight cycle share it.
pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    if state.mode == ScrapeMode::OnDemand {
        state.coordinator.scrape_once().await;
    }

    let mut body = state.coordinator.registry().render()?;
    if let Some(handle) = &state.telemetry {
        body.push_str(&handle.render());
    }

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        body,
    ))
}

/// Landing page pointing at the metrics endpoint
pub async fn index(State(state): State<AppState>) -> impl IntoResponse {
    format!("Hello, please go to {:?} for metrics\n", state.metrics_path.as_ref())
}
