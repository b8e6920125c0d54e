use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use mysql_count_exporter::{
    config::{self, Config},
    init_default_tracing, init_tracing,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    match args.get_command() {
        cli::Commands::Start => {
            let cfg = load_config(&args)?;
            commands::start::execute(cfg).await?;
        }
        cli::Commands::Check => {
            let cfg = load_config(&args)?;
            commands::check::execute(&cfg)?;
        }
        cli::Commands::Version => {
            println!("MySQL Count Exporter v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

/// Load configuration and initialize tracing from it.
/// Configuration errors are fatal and logged through a default subscriber.
fn load_config(args: &cli::Cli) -> Result<Config> {
    match config::load_config(&args.config, &args.overrides()) {
        Ok(cfg) => {
            init_tracing(&cfg.server);
            Ok(cfg)
        }
        Err(e) => {
            init_default_tracing();
            tracing::error!("Invalid configuration: {:#}", e);
            Err(e)
        }
    }
}
