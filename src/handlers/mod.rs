pub mod health;
pub mod metrics_handler;

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::ScrapeMode;
use crate::coordinator::ScrapeCoordinator;
use crate::refresh::RefreshState;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ScrapeCoordinator>,
    pub mode: ScrapeMode,
    pub metrics_path: Arc<str>,
    /// Exporter self-telemetry; absent when no global recorder is installed
    pub telemetry: Option<Arc<PrometheusHandle>>,
    /// Present in interval mode
    pub refresh_state: Option<watch::Receiver<RefreshState>>,
}
