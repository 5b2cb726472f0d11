//! Murmur - realtime chat backend
//!
//! Standalone server binary. Opens the SQLite store, starts the TCP
//! server, and runs until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use murmur_core::Database;
use murmur_net::Server;

mod config;

use config::Config;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("murmur.toml"));

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Initialize logging; RUST_LOG overrides the configured filter
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .init();

    tracing::info!("Starting Murmur");

    let db_path = match config.resolve_database_path() {
        Ok(path) => path,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    let database = match Database::open(&db_path) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(path = %db_path.display(), error = %e, "Failed to open database");
            std::process::exit(1);
        }
    };
    tracing::info!(path = %db_path.display(), "Database ready");

    let store = Arc::new(Mutex::new(database));
    let server = match Server::start(config.port, store).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start server");
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    tracing::info!("Shutting down");
    server.shutdown();
}
