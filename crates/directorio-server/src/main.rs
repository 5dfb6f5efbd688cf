//! # directorio-server
//!
//! HTTP API server for the Directorio client directory.
//!
//! This binary provides:
//! - **REST API** (axum) over the client entity store: ranked search and
//!   listing, create/edit with per-field change history, soft delete and
//!   restore
//! - **Logo storage** for client records (opaque image files on disk)
//! - **Bearer-token authentication** resolving each request to a stored
//!   identity; mutations are role-gated inside the store layer

mod api;
mod auth;
mod config;
mod error;
mod logo_store;

use std::sync::{Arc, Mutex};

use tracing::info;
use tracing_subscriber::EnvFilter;

use directorio_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::logo_store::LogoStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,directorio_server=debug")),
        )
        .init();

    info!("Starting Directorio server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Client directory store (runs migrations on open)
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };

    // Logo store (creates directory if missing)
    let logo_store = Arc::new(
        LogoStore::new(config.logo_storage_path.clone(), config.max_logo_size).await?,
    );

    let app_state = AppState {
        db: Arc::new(Mutex::new(db)),
        logo_store,
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    // tokio::select! ensures that if either the HTTP server or a shutdown
    // signal arrives, we exit cleanly.
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
