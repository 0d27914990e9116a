//! Umbrella binary: `actstream server` runs the tool-server RPC surface
//! (spec §4.9), `actstream upload` runs the segment uploader (spec §4.8).
//! The two are deployed as separate processes, typically on separate
//! hosts (spec §4.8: "typically on a separate host"); this binary just
//! saves operators from building two crates.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use actstream_breaker::BreakerRegistry;
use actstream_db::PoolManager;
use actstream_secrets::Vault;
use actstream_server::{AppState, ServerConfig};
use actstream_uploader::{Uploader, UploaderConfig};

#[derive(Parser)]
#[command(name = "actstream")]
#[command(author, version, about = "Activity stream ingest core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tool server: `log_event`, `get_context`, `submit_query`,
    /// `log_insight`, plus the `/metrics` endpoint (spec §4.9, §6).
    Server {
        /// Optional `--config` TOML override for local development.
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Run the segment uploader loop (spec §4.8).
    Upload,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Server { config } => run_server(config.as_deref()).await,
        Commands::Upload => run_uploader().await,
    }
}

async fn run_server(config_override: Option<&std::path::Path>) -> anyhow::Result<()> {
    let config = ServerConfig::load(config_override)?;
    let bind = config.http_bind.clone();
    let health_interval = Duration::from_millis(config.pool.liveness_probe_interval_ms);
    let breaker_cleanup_interval = Duration::from_millis(config.breaker.failure_window_ms);

    let (state, warmer) = AppState::bootstrap(config).await?;

    actstream_db::spawn_liveness_probe(Arc::clone(&state.pool), health_interval);
    actstream_server::health_monitor::spawn(Arc::clone(&state.pool), health_interval);
    actstream_queue::spawn_periodic_flush(Arc::clone(&state.queue), 100);
    actstream_server::tickets::spawn_eviction_sweep(Arc::clone(&state.tickets), 60_000);
    actstream_breaker::spawn_cleanup(Arc::clone(&state.breakers), breaker_cleanup_interval);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(warmer.config().interval_ms));
        loop {
            ticker.tick().await;
            warmer.run_once().await;
        }
    });

    let router = actstream_server::http::router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(bind = %bind, "tool server listening");
    axum::serve(listener, router).await?;
    Ok(())
}

async fn run_uploader() -> anyhow::Result<()> {
    let server_config = ServerConfig::load(None)?;
    let vault = Arc::new(Vault::from_identities(server_config.identities.clone(), server_config.vault_key.clone()));
    let breakers = Arc::new(BreakerRegistry::new(server_config.breaker));
    let pool = Arc::new(PoolManager::new(server_config.dsn.clone(), vault, breakers, server_config.pool));

    let uploader_config = UploaderConfig::from_env();
    std::fs::create_dir_all(uploader_config.processed_dir())?;
    std::fs::create_dir_all(uploader_config.error_dir())?;

    let uploader = Arc::new(Uploader::new(uploader_config, pool));
    tracing::info!("uploader starting poll loop");
    uploader.run_forever().await;
}
