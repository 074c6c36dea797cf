//! Core types for the blob storage engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// A cache entry for a stored blob.
///
/// `data` is `None` for metadata-only entries (recorded on save, before any
/// read has buffered the bytes). Metadata-only entries can answer HEAD
/// requests but are never served as a full-body cache hit.
#[derive(Debug, Clone)]
pub struct CachedBlob {
    pub data: Option<Vec<u8>>,
    pub size: u64,
    pub content_type: String,
    pub etag: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful save.
#[derive(Debug, Clone)]
pub struct SavedBlob {
    pub size: u64,
    pub content_type: String,
    pub etag: String,
    pub path: PathBuf,
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Configuration for the blob storage engine, fixed at startup.
#[derive(Debug, Clone)]
pub struct BlobStoreConfig {
    /// Root directory for stored blobs.
    pub root: PathBuf,
    /// Maximum number of cache entries.
    pub max_cache_entries: usize,
    /// Maximum aggregate bytes of cached blob data.
    pub max_cache_bytes: u64,
    /// Time-to-live for cache entries.
    pub cache_ttl: Duration,
    /// Files smaller than this are buffered into the cache on first read.
    pub small_file_limit: u64,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./storage/docs"),
            max_cache_entries: 100,
            max_cache_bytes: 100 * 1024 * 1024, // 100MB
            cache_ttl: Duration::from_secs(5 * 60),
            small_file_limit: 2 * 1024 * 1024, // 2MB
        }
    }
}
