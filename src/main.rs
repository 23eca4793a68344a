//! Hashgame engine binary
//!
//! Wires configuration, logging, the block oracle, storage and the game
//! manager together and runs until Ctrl-C.

use clap::Parser;
use hashgame::common::config::generate_sample_config;
use hashgame::store::open_store;
use hashgame::{BlockOracle, ConfigLoader, GameManager, StrategyRegistry};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hashgame")]
#[command(about = "Provably fair hash-game round engine", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Tracing filter directive (overrides RUST_LOG and the config file)
    #[arg(long)]
    log_filter: Option<String>,

    /// Write a sample configuration to this path and exit
    #[arg(long)]
    generate_config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(path) = args.generate_config {
        generate_sample_config(&path)?;
        println!("Sample configuration written to {}", path);
        return Ok(());
    }

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let config = loader.load()?;

    let filter = match &args.log_filter {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter())),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        endpoints = ?config.oracle.endpoints,
        round_interval = config.rooms.round_interval,
        backend = ?config.storage.backend,
        "starting hashgame engine"
    );

    let oracle = Arc::new(BlockOracle::from_config(&config.oracle));
    let store = open_store(&config.storage)?;
    let manager = GameManager::start(StrategyRegistry::with_defaults(), oracle, store, &config).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    manager.shutdown().await;

    Ok(())
}
