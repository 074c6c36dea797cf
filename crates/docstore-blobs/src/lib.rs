//! Durable blob storage engine for the document server
//!
//! Persists uploaded files on the local filesystem with atomic
//! write-then-rename semantics, serves them back over HTTP-shaped
//! responses, and accelerates repeated reads with a bounded, expiring
//! in-memory cache. Single-process, single-filesystem by design.

mod cache;
mod error;
mod locks;
mod paths;
mod serve;
mod store;
mod types;

pub use cache::BlobCache;
pub use error::{BlobStoreError, Result};
pub use locks::LockRegistry;
pub use store::BlobStore;
pub use types::{BlobStoreConfig, CacheStats, CachedBlob, SavedBlob};
