use clap::{Parser, Subcommand};
use std::path::PathBuf;

use mysql_count_exporter::config::{ConfigOverrides, ScrapeMode};

#[derive(Parser, Debug)]
#[command(name = "mysql-count-exporter", version, about = "Exports MySQL table row counts to Prometheus")]
pub struct Cli {
    /// Configuration file path (optional; missing file means defaults)
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    /// MySQL data source name (URL or user:pass@tcp(host:port)/db)
    #[arg(long, env = "DATA_SOURCE_NAME", hide_env_values = true, global = true)]
    pub dsn: Option<String>,

    /// The address to listen on for telemetry
    #[arg(long, global = true)]
    pub listen_address: Option<String>,

    /// Path under which to expose metrics
    #[arg(long, global = true)]
    pub telemetry_path: Option<String>,

    /// The maximum number of connections that will be opened to mysql
    #[arg(long, global = true)]
    pub max_connections: Option<u32>,

    /// Regex that matches `schema.table` names to ignore
    #[arg(long, global = true)]
    pub ignore: Option<String>,

    /// Seconds between scrape cycles (interval mode)
    #[arg(long, global = true)]
    pub refresh_interval: Option<u64>,

    /// Refresh in the background or on every pull
    #[arg(long, value_enum, global = true)]
    pub scrape_mode: Option<ScrapeMode>,

    /// Log output format: text or json
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the exporter (default)
    Start,

    /// Validate configuration and print a summary
    Check,

    /// Show version information
    Version,
}

impl Cli {
    /// Get the command to execute, defaulting to Start if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Start)
    }

    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            dsn: self.dsn.clone(),
            listen_address: self.listen_address.clone(),
            metrics_path: self.telemetry_path.clone(),
            max_connections: self.max_connections,
            ignore_pattern: self.ignore.clone(),
            refresh_interval_seconds: self.refresh_interval,
            mode: self.scrape_mode,
            log_format: self.log_format.clone(),
        }
    }
}
