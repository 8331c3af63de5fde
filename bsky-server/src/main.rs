use std::path::PathBuf;

use anyhow::Result;
use bsky_server::{config::Config, server::run_with_config_until_ctrl_c};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Aggregator for content-addressed social repositories.
#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cli {
    /// TOML config file. Defaults apply to everything not set there.
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Overrides the HTTP port.
    #[clap(short, long)]
    port: Option<u16>,
    /// Keeps all blocks in memory.
    #[clap(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load(path).await?,
        None => Config::default(),
    };
    if let Some(port) = cli.port {
        config.http.port = port;
    }
    config.in_memory |= cli.in_memory;
    info!(config = ?cli.config, port = config.http.port, in_memory = config.in_memory, "starting");

    run_with_config_until_ctrl_c(config).await
}
