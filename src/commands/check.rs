use anyhow::Result;
use mysql_count_exporter::{config::Config, db::dsn::mask_dsn};
use tracing::info;

/// Execute the check command
///
/// The configuration has already been loaded and validated by the time this
/// runs; this prints what the exporter would start with.
pub fn execute(cfg: &Config) -> Result<()> {
    info!("Configuration validation completed successfully");

    println!("✓ Configuration is valid");
    println!();
    println!("Configuration Summary:");
    println!("  Listen: {}", cfg.listen_addr()?);
    println!("  Metrics path: {}", cfg.server.metrics_path);
    println!("  Log: {} ({})", cfg.server.log_level, cfg.server.log_format);
    println!();
    println!("  DSN: {}", mask_dsn(&cfg.database.dsn));
    println!("  Max connections: {}", cfg.database.max_connections);
    println!();
    println!("  Scrape mode: {}", cfg.scrape.mode.as_str());
    println!("  Refresh interval: {}s", cfg.scrape.refresh_interval_seconds);
    println!("  Failure threshold: {}", cfg.scrape.failure_threshold);
    println!("  Count timeout: {}s", cfg.scrape.count_timeout_seconds);
    match cfg.scrape.ignore_pattern.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(pattern) => println!("  Ignore pattern: {}", pattern),
        None => println!("  Ignore pattern: (none)"),
    }

    let mut masked = cfg.clone();
    masked.database.dsn = mask_dsn(&cfg.database.dsn);
    println!();
    println!("Effective configuration:");
    println!("{}", toml::to_string_pretty(&masked)?);

    Ok(())
}
