//! Exporter self-telemetry, recorded through the `metrics` facade.
//!
//! Row counts live in [`MetricRegistry`](crate::registry::MetricRegistry);
//! this module only covers how the exporter itself is doing.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

pub const SCRAPES_TOTAL: &str = "mysql_count_exporter_scrapes_total";
pub const SCRAPE_DURATION: &str = "mysql_count_exporter_scrape_duration_seconds";
pub const TABLES_DISCOVERED: &str = "mysql_count_exporter_tables_discovered";
pub const CONSECUTIVE_FAILURES: &str = "mysql_count_exporter_consecutive_failures";
pub const EXPORTER_INFO: &str = "mysql_count_exporter_info";

/// Install the global Prometheus recorder
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    init_metric_descriptions();

    Ok(handle)
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(SCRAPES_TOTAL, "Scrape cycles run, by result");
    describe_histogram!(SCRAPE_DURATION, "Duration of a full scrape cycle in seconds");
    describe_gauge!(TABLES_DISCOVERED, "Tables returned by the last successful discovery");
    describe_gauge!(
        CONSECUTIVE_FAILURES,
        "Scrape cycles that failed in a row since the last success"
    );
    describe_gauge!(EXPORTER_INFO, "Exporter version and build information");

    gauge!(EXPORTER_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record a finished scrape cycle
pub fn record_scrape(success: bool, duration: Duration) {
    let result = if success { "success" } else { "failure" };
    counter!(SCRAPES_TOTAL, "result" => result).increment(1);
    histogram!(SCRAPE_DURATION).record(duration.as_secs_f64());
}

pub fn record_tables_discovered(count: usize) {
    gauge!(TABLES_DISCOVERED).set(count as f64);
}

pub fn record_failure_streak(streak: u32) {
    gauge!(CONSECUTIVE_FAILURES).set(f64::from(streak));
}
