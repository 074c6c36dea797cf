//! Blob storage engine
//!
//! Owns the on-disk blob tree, the per-document lock registry, and the
//! in-memory cache. Saves go through a write-then-publish protocol: the
//! bytes are streamed to a `.tmp` sibling, forced to stable storage, and
//! atomically renamed onto the final path, so concurrent readers see
//! either the old complete file or the new complete file.

use crate::cache::BlobCache;
use crate::error::{BlobStoreError, Result};
use crate::locks::LockRegistry;
use crate::paths::{resolve_blob_path, temp_path};
use crate::types::{BlobStoreConfig, CacheStats, CachedBlob, SavedBlob};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

pub struct BlobStore {
    root: PathBuf,
    pub(crate) cache: BlobCache,
    pub(crate) locks: LockRegistry,
    pub(crate) small_file_limit: u64,
}

impl BlobStore {
    /// Create the engine, ensuring the storage root exists.
    pub async fn new(config: BlobStoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.root).await?;
        info!(root = %config.root.display(), "Blob storage initialized");

        Ok(Self {
            root: config.root,
            cache: BlobCache::new(
                config.max_cache_entries,
                config.max_cache_bytes,
                config.cache_ttl,
            ),
            locks: LockRegistry::new(),
            small_file_limit: config.small_file_limit,
        })
    }

    /// Persist `reader` as the blob for (`id`, `filename`).
    ///
    /// On any failure the temp file is removed and the final path is left
    /// untouched. On success a metadata-only cache entry is recorded so a
    /// following HEAD can skip the filesystem entirely.
    pub async fn save(
        &self,
        id: &str,
        filename: &str,
        reader: impl AsyncRead + Unpin,
    ) -> Result<SavedBlob> {
        let _guard = self.locks.acquire(id).await;

        let path = resolve_blob_path(&self.root, id, filename).await;
        let tmp = temp_path(&path);

        let (size, etag) = match write_blob(&tmp, &path, reader).await {
            Ok(result) => result,
            Err(err) => {
                let _ = fs::remove_file(&tmp).await;
                return Err(BlobStoreError::Io(Box::new(err)));
            }
        };

        let content_type = content_type_for(filename);
        debug!(id, size, content_type = %content_type, "Saved blob");

        // Metadata only: the bytes are not buffered on the save path.
        self.cache
            .store(
                id,
                CachedBlob {
                    data: None,
                    size,
                    content_type: content_type.clone(),
                    etag: etag.clone(),
                    created_at: Utc::now(),
                },
            )
            .await;

        Ok(SavedBlob {
            size,
            content_type,
            etag,
            path,
        })
    }

    /// Remove the blob for (`id`, `filename`) from disk and cache.
    ///
    /// Deleting an absent blob is not an error; the outcome is the same.
    pub async fn delete(&self, id: &str, filename: &str) -> Result<()> {
        let _guard = self.locks.acquire(id).await;

        let path = resolve_blob_path(&self.root, id, filename).await;
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(BlobStoreError::Io(Box::new(err))),
        }

        self.cache.delete(id).await;
        debug!(id, "Deleted blob");
        Ok(())
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub(crate) async fn blob_path(&self, id: &str, filename: &str) -> PathBuf {
        resolve_blob_path(&self.root, id, filename).await
    }
}

/// Infer a content type from the filename extension, defaulting to a
/// generic binary type.
pub(crate) fn content_type_for(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .to_string()
}

/// Stream `reader` into `tmp`, hashing as it goes, force the bytes to
/// stable storage, then atomically rename onto `path`. Returns the byte
/// count and the hex-encoded content hash.
async fn write_blob(
    tmp: &Path,
    path: &Path,
    mut reader: impl AsyncRead + Unpin,
) -> std::io::Result<(u64, String)> {
    let mut file = fs::File::create(tmp).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut size: u64 = 0;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        file.write_all(&buf[..n]).await?;
        size += n as u64;
    }

    // A crash between write and rename must never leave a corrupt file at
    // the final path, so the temp file hits stable storage first.
    file.sync_all().await?;
    drop(file);

    fs::rename(tmp, path).await?;
    Ok((size, hex::encode(hasher.finalize())))
}
