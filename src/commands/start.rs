use anyhow::Result;
use mysql_count_exporter::{config::Config, server};
use tracing::info;

/// Execute the start command
///
/// Blocks until a shutdown signal is received.
pub async fn execute(cfg: Config) -> Result<()> {
    info!(
        mode = cfg.scrape.mode.as_str(),
        refresh_interval_secs = cfg.scrape.refresh_interval_seconds,
        "Starting exporter in foreground mode"
    );

    server::start_server(cfg).await
}
