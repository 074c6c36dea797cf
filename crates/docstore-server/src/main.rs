//! Document storage service
//!
//! HTTP front end over the blob storage engine: durable uploads, cached
//! downloads, deletes, and a health endpoint with cache statistics.

mod error;
mod server;
mod types;

use crate::error::AppError;
use crate::server::{start_server, ServerState, SharedState};
use crate::types::ServerConfig;
use docstore_blobs::{BlobStore, BlobStoreConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("docstore_server=info".parse()?)
        .add_directive("docstore_blobs=info".parse()?);

    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    info!("Starting document storage service...");

    let config = load_config();
    info!("Port: {}", config.port);
    info!("Storage dir: {:?}", config.storage_dir);
    info!(
        "Max cache size: {} MB, {} entries",
        config.max_cache_bytes / (1024 * 1024),
        config.max_cache_entries
    );
    info!("Cache TTL: {} seconds", config.cache_ttl.as_secs());
    info!("Small file limit: {} bytes", config.small_file_limit);

    let store = BlobStore::new(BlobStoreConfig {
        root: config.storage_dir.clone(),
        max_cache_entries: config.max_cache_entries,
        max_cache_bytes: config.max_cache_bytes,
        cache_ttl: config.cache_ttl,
        small_file_limit: config.small_file_limit,
    })
    .await?;

    let state: SharedState = Arc::new(ServerState::new(store));

    start_server(state, config.port)
        .await
        .map_err(|e| AppError::Config(format!("Server error: {}", e)))?;

    Ok(())
}

fn load_config() -> ServerConfig {
    let defaults = ServerConfig::default();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(defaults.port);

    let storage_dir = std::env::var("STORAGE_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.storage_dir);

    let max_cache_entries = std::env::var("MAX_CACHE_ENTRIES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(defaults.max_cache_entries);

    let max_cache_bytes = std::env::var("MAX_CACHE_BYTES")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(defaults.max_cache_bytes);

    let cache_ttl = std::env::var("CACHE_TTL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(defaults.cache_ttl);

    let small_file_limit = std::env::var("SMALL_FILE_LIMIT")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(defaults.small_file_limit);

    ServerConfig {
        port,
        storage_dir,
        max_cache_entries,
        max_cache_bytes,
        cache_ttl,
        small_file_limit,
    }
}
