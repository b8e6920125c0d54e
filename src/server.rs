use anyhow::{Context, Result};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    config::{Config, ScrapeMode},
    coordinator::ScrapeCoordinator,
    counter::RowCounter,
    db::{dsn, MySqlExecutor, QueryExecutor},
    discovery::{IgnoreFilter, TableDiscovery},
    handlers::{self, AppState},
    refresh::RefreshLoop,
    registry::MetricRegistry,
    signals::setup_signal_handlers,
};

/// Wire discovery, counting and a fresh registry around `executor`
pub fn build_coordinator(
    config: &Config,
    executor: Arc<dyn QueryExecutor>,
) -> Result<Arc<ScrapeCoordinator>> {
    let ignore = IgnoreFilter::new(config.scrape.ignore_pattern.as_deref())
        .context("Invalid ignore pattern")?;
    let registry = Arc::new(MetricRegistry::new().context("Failed to create metric registry")?);

    let discovery = TableDiscovery::new(executor.clone(), ignore);
    let counter = RowCounter::new(executor, config.scrape.count_timeout());

    Ok(Arc::new(ScrapeCoordinator::new(
        discovery,
        counter,
        registry,
        config.database.max_connections as usize,
        config.scrape.failure_threshold,
    )))
}

/// Create the Axum router
pub fn create_router(state: AppState) -> Router {
    let metrics_path = state.metrics_path.to_string();

    Router::new()
        .route("/", get(handlers::metrics_handler::index))
        .route("/health", get(handlers::health::health_check))
        .route(&metrics_path, get(handlers::metrics_handler::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the exporter
///
/// This function:
/// 1. Builds the lazily-connected MySQL pool and the scrape coordinator
/// 2. Starts the refresh loop (interval mode)
/// 3. Binds the listen address and serves until SIGTERM/SIGINT
pub async fn start_server(config: Config) -> Result<()> {
    info!("MySQL count exporter starting...");

    let telemetry = crate::metrics::init_metrics()?;

    let url = dsn::normalize_dsn(&config.database.dsn)
        .context("Data source name is not a valid MySQL DSN")?;
    let executor = MySqlExecutor::connect_lazy(&url, &config.database)
        .context("Failed to configure database pool")?;
    info!(
        dsn = %dsn::mask_dsn(&config.database.dsn),
        max_connections = config.database.max_connections,
        "Database pool configured"
    );

    let coordinator = build_coordinator(&config, Arc::new(executor.clone()))?;

    let (shutdown_tx, signal_handle) = setup_signal_handlers();

    let (refresh_handle, refresh_state) = match config.scrape.mode {
        ScrapeMode::Interval => {
            let refresh = RefreshLoop::new(
                coordinator.clone(),
                config.scrape.refresh_interval(),
                config.scrape.max_backoff(),
            );
            let state = refresh.subscribe();
            let handle = tokio::spawn(refresh.run(shutdown_tx.subscribe()));
            (Some(handle), Some(state))
        }
        ScrapeMode::OnDemand => {
            info!("On-demand mode: each pull triggers a scrape cycle");
            (None, None)
        }
    };

    let state = AppState {
        coordinator,
        mode: config.scrape.mode,
        metrics_path: Arc::from(config.server.metrics_path.as_str()),
        telemetry: Some(Arc::new(telemetry)),
        refresh_state,
    };
    let app = create_router(state);

    let addr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(
        "Listening on {}, metrics at {}",
        addr, config.server.metrics_path
    );

    let mut shutdown_rx = shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    // Server may stop for reasons other than a signal; make sure the loop hears about it
    let _ = shutdown_tx.send(crate::signals::ShutdownSignal::Graceful);
    if let Some(handle) = refresh_handle {
        handle.await?;
    }
    signal_handle.abort();
    executor.close().await;
    info!("Exporter stopped gracefully");

    Ok(())
}
