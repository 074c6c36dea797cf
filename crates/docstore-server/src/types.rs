//! Core types for the document storage service

use docstore_blobs::CacheStats;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the service, parsed from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub storage_dir: PathBuf,
    pub max_cache_entries: usize,
    pub max_cache_bytes: u64,
    pub cache_ttl: Duration,
    pub small_file_limit: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3002,
            storage_dir: PathBuf::from("./storage/docs"),
            max_cache_entries: 100,
            max_cache_bytes: 100 * 1024 * 1024, // 100MB
            cache_ttl: Duration::from_secs(5 * 60),
            small_file_limit: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}

/// Response body for a completed upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: String,
    pub filename: String,
    pub size: u64,
    pub content_type: String,
    pub etag: String,
}
