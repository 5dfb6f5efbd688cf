//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Explicit SQLite database path.  When unset the store picks the
    /// platform data directory.
    /// Env: `DATABASE_PATH`
    pub database_path: Option<PathBuf>,

    /// Filesystem path where client logos are stored.
    /// Env: `LOGO_STORAGE_PATH`
    /// Default: `./logos`
    pub logo_storage_path: PathBuf,

    /// Maximum accepted logo upload in bytes.
    /// Env: `MAX_LOGO_SIZE`
    /// Default: 5 MiB.
    pub max_logo_size: usize,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Directorio"`
    pub instance_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: None,
            logo_storage_path: PathBuf::from("./logos"),
            max_logo_size: 5 * 1024 * 1024, // 5 MiB
            instance_name: "Directorio".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(
                    value = %addr,
                    "Invalid HTTP_ADDR, using default"
                );
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(path) = std::env::var("LOGO_STORAGE_PATH") {
            config.logo_storage_path = PathBuf::from(path);
        }

        if let Ok(val) = std::env::var("MAX_LOGO_SIZE") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_logo_size = n;
            } else {
                tracing::warn!(value = %val, "Invalid MAX_LOGO_SIZE, using default");
            }
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
