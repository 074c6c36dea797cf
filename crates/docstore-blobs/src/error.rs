//! Error types for the blob storage engine

use std::fmt;

#[derive(Debug)]
pub enum BlobStoreError {
    /// The blob is absent from both the cache and the filesystem.
    NotFound,
    /// A filesystem create/write/rename/read/stat operation failed.
    Io(Box<std::io::Error>),
}

impl fmt::Display for BlobStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobStoreError::NotFound => write!(f, "blob not found"),
            BlobStoreError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for BlobStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BlobStoreError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BlobStoreError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            BlobStoreError::NotFound
        } else {
            BlobStoreError::Io(Box::new(err))
        }
    }
}

pub type Result<T> = std::result::Result<T, BlobStoreError>;
