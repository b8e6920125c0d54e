use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use super::AppState;
use crate::coordinator::CycleOutcome;

/// Health check endpoint
///
/// Always 200 while the process is up: database trouble is reported in the
/// body and through the scrape metrics, not as an unhealthy exporter.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let last_scrape = state.coordinator.last_report().map(|report| {
        let (result, error) = match &report.outcome {
            CycleOutcome::Success { .. } => ("success", None),
            CycleOutcome::DiscoveryFailed(e) => ("failure", Some(e.to_string())),
            CycleOutcome::Aborted(reason) => ("aborted", Some(reason.clone())),
        };
        json!({
            "generation": report.generation,
            "result": result,
            "error": error,
            "published": report.published.len(),
            "duration_ms": report.duration.as_millis() as u64,
        })
    });

    let refresh_state = state
        .refresh_state
        .as_ref()
        .map(|rx| rx.borrow().as_str());

    (StatusCode::OK, Json(json!({
        "status": "healthy",
        "service": "mysql-count-exporter",
        "version": env!("CARGO_PKG_VERSION"),
        "mode": state.mode.as_str(),
        "refresh_state": refresh_state,
        "consecutive_failures": state.coordinator.consecutive_failures(),
        "last_scrape": last_scrape,
    })))
}
