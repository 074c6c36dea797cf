//! Blob path resolution
//!
//! Maps a (document id, filename) pair to an on-disk path. Files are
//! sharded into subdirectories keyed by the first two characters of the
//! id to bound directory fan-out.

use std::path::{Path, PathBuf};
use tracing::warn;

/// Resolve the on-disk path for a blob: `<root>/<id[..2]>/<id>_<filename>`.
///
/// The shard directory is created on demand. If creating it fails, the
/// blob falls back to a flat path directly under the root; the caller
/// never sees the failure.
pub(crate) async fn resolve_blob_path(root: &Path, id: &str, filename: &str) -> PathBuf {
    let name = format!("{}_{}", id, filename);
    let shard = id.get(..2).unwrap_or(id);
    if shard.is_empty() {
        return root.join(name);
    }

    let dir = root.join(shard);
    if let Err(err) = tokio::fs::create_dir_all(&dir).await {
        warn!(error = %err, id, "Failed to create shard directory, using flat path");
        return root.join(name);
    }

    dir.join(name)
}

/// The transient sibling path used during a save, `<path>.tmp`.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}
