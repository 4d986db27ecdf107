//! Keywarden license verification service.
//!
//! Serves `GET /verify` for client license checks and `GET /health` for
//! monitoring. All policy configuration comes from the environment; the
//! CLI only covers port, database path, and log verbosity.
//!
//! Usage:
//!   keywarden-server --port 8080

use anyhow::{Context, Result};
use clap::Parser;
use keywarden_server::config::Config;
use keywarden_server::{build_router, AppState};
use keywarden_store::LicenseStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "keywarden-server")]
#[command(about = "Keywarden license verification service")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Database path, overriding DB_PATH from the environment
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let mut config = Config::from_env();
    if let Some(database) = args.database {
        config.db_path = database;
    }

    info!("Keywarden starting...");
    if config.api_key.is_empty() {
        warn!("API_KEY is empty; API key enforcement is off");
    }
    if config.shared_secret.is_empty() {
        warn!("SHARED_SECRET is empty; signature enforcement is off");
    }

    let store = LicenseStore::open(&config.db_path)
        .with_context(|| format!("failed to open license store at {}", config.db_path.display()))?;
    info!("License store ready: {}", config.db_path.display());

    let state = AppState {
        config: Arc::new(config),
        store,
    };
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("HTTP server failed")?;

    Ok(())
}
