use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::discovery::IgnoreFilter;

/// Environment variable prefix, e.g. `COUNT_EXPORTER__DATABASE__MAX_CONNECTIONS=4`
pub const ENV_PREFIX: &str = "COUNT_EXPORTER";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scrape: ScrapeConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// `host:port`, or `:port` to listen on all interfaces
    pub listen_address: String,
    pub metrics_path: String,
    pub log_level: String,
    pub log_format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub dsn: String,
    /// Upper bound on concurrently open connections (and concurrent count queries)
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeMode {
    /// Background loop refreshes counts; pulls serve the latest values
    Interval,
    /// Every pull triggers a (deduplicated) scrape cycle
    OnDemand,
}

impl ScrapeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interval => "interval",
            Self::OnDemand => "on_demand",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScrapeConfig {
    pub mode: ScrapeMode,
    pub refresh_interval_seconds: u64,
    /// Consecutive failed cycles after which all row count series are cleared
    pub failure_threshold: u32,
    pub max_backoff_seconds: u64,
    pub count_timeout_seconds: u64,
    /// Regex matched against `schema.table`; empty or absent disables ignoring
    #[serde(default)]
    pub ignore_pattern: Option<String>,
}

impl ScrapeConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_seconds)
    }

    pub fn count_timeout(&self) -> Duration {
        Duration::from_secs(self.count_timeout_seconds)
    }
}

impl Config {
    /// Resolve the listen address, accepting the `:9557` shorthand
    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        parse_listen_address(&self.server.listen_address)
    }
}

/// Values supplied on the command line; each one, when present, wins over
/// the file and the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub dsn: Option<String>,
    pub listen_address: Option<String>,
    pub metrics_path: Option<String>,
    pub max_connections: Option<u32>,
    pub ignore_pattern: Option<String>,
    pub refresh_interval_seconds: Option<u64>,
    pub mode: Option<ScrapeMode>,
    pub log_format: Option<String>,
}

/// Load configuration: defaults, then the TOML file (optional), then
/// `COUNT_EXPORTER__*` environment variables, then command-line overrides.
pub fn load_config(path: &Path, overrides: &ConfigOverrides) -> anyhow::Result<Config> {
    let builder = config::Config::builder()
        .set_default("server.listen_address", ":9557")?
        .set_default("server.metrics_path", "/metrics")?
        .set_default("server.log_level", "info")?
        .set_default("server.log_format", "text")?
        .set_default("database.dsn", "")?
        .set_default("database.max_connections", 1_i64)?
        .set_default("database.acquire_timeout_seconds", 10_i64)?
        .set_default("scrape.mode", "interval")?
        .set_default("scrape.refresh_interval_seconds", 30_i64)?
        .set_default("scrape.failure_threshold", 3_i64)?
        .set_default("scrape.max_backoff_seconds", 300_i64)?
        .set_default("scrape.count_timeout_seconds", 30_i64)?
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("database.dsn", overrides.dsn.clone())?
        .set_override_option("server.listen_address", overrides.listen_address.clone())?
        .set_override_option("server.metrics_path", overrides.metrics_path.clone())?
        .set_override_option("server.log_format", overrides.log_format.clone())?
        .set_override_option(
            "database.max_connections",
            overrides.max_connections.map(i64::from),
        )?
        .set_override_option("scrape.ignore_pattern", overrides.ignore_pattern.clone())?
        .set_override_option(
            "scrape.refresh_interval_seconds",
            overrides.refresh_interval_seconds.map(|s| s as i64),
        )?
        .set_override_option("scrape.mode", overrides.mode.map(|m| m.as_str()))?;

    let cfg: Config = builder
        .build()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?
        .try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.database.dsn.trim().is_empty() {
        anyhow::bail!("A data source name must be configured (--dsn or DATA_SOURCE_NAME)");
    }

    if crate::db::dsn::normalize_dsn(&cfg.database.dsn).is_none() {
        anyhow::bail!("Data source name is not a valid MySQL DSN");
    }

    if cfg.database.max_connections == 0 {
        anyhow::bail!("database.max_connections must be at least 1");
    }

    if cfg.scrape.refresh_interval_seconds == 0 {
        anyhow::bail!("scrape.refresh_interval_seconds must be at least 1");
    }

    if cfg.scrape.failure_threshold == 0 {
        anyhow::bail!("scrape.failure_threshold must be at least 1");
    }

    if cfg.scrape.count_timeout_seconds == 0 {
        anyhow::bail!("scrape.count_timeout_seconds must be at least 1");
    }

    let path = cfg.server.metrics_path.as_str();
    if !path.starts_with('/') || path == "/" || path == "/health" {
        anyhow::bail!("Invalid metrics path '{}'", path);
    }

    if !matches!(cfg.server.log_format.as_str(), "text" | "json") {
        anyhow::bail!("server.log_format must be 'text' or 'json'");
    }

    IgnoreFilter::new(cfg.scrape.ignore_pattern.as_deref())
        .context("scrape.ignore_pattern is not a valid regular expression")?;

    cfg.listen_addr()?;

    Ok(())
}

fn parse_listen_address(addr: &str) -> anyhow::Result<SocketAddr> {
    if let Some(port) = addr.strip_prefix(':') {
        let port: u16 = port
            .parse()
            .with_context(|| format!("Invalid listen port in '{}'", addr))?;
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }

    addr.parse()
        .with_context(|| format!("Invalid listen address '{}'", addr))
}
