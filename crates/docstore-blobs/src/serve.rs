//! Serving blobs into HTTP responses
//!
//! GET requests are answered from the cache when the bytes are resident,
//! otherwise from disk via `tower_http`'s `ServeFile`, which brings range
//! and conditional-request handling along. Small files are buffered into
//! the cache on their first disk read; HEAD requests emit headers only.

use crate::error::{BlobStoreError, Result};
use crate::store::{content_type_for, BlobStore};
use crate::types::CachedBlob;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::Response;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::fs;
use tower_http::services::ServeFile;
use tracing::debug;

impl BlobStore {
    /// Serve the blob for (`id`, `filename`) into an HTTP response.
    ///
    /// The request's method selects full-body (GET) versus metadata-only
    /// (HEAD) handling; its headers drive range and conditional transfer
    /// on the disk path.
    pub async fn serve(&self, id: &str, filename: &str, req: Request) -> Result<Response> {
        if req.method() == Method::HEAD {
            return self.serve_head(id, filename).await;
        }

        let cached = self.cache.get(id).await;
        if let Some(entry) = &cached {
            // Metadata-only entries know the headers but not the bytes;
            // only a data-bearing entry is a full-body hit. Range requests
            // take the disk path so ServeFile handles the byte slicing.
            if let Some(data) = &entry.data {
                if !req.headers().contains_key(header::RANGE) {
                    if if_none_match(&req, &entry.etag) {
                        return Ok(not_modified_response(&entry.etag));
                    }
                    debug!(id, "Serving blob from cache");
                    return Ok(blob_response(&entry.content_type, &entry.etag, data.clone()));
                }
            }
        }

        self.serve_from_disk(id, filename, req, cached.map(|entry| entry.etag))
            .await
    }

    async fn serve_head(&self, id: &str, filename: &str) -> Result<Response> {
        if let Some(entry) = self.cache.get(id).await {
            let mut response = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, entry.content_type)
                .header(header::CONTENT_LENGTH, entry.size)
                .body(Body::empty())
                .unwrap();
            set_etag(&mut response, &entry.etag);
            return Ok(response);
        }

        let path = self.blob_path(id, filename).await;
        let meta = fs::metadata(&path).await?;

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type_for(filename))
            .header(header::CONTENT_LENGTH, meta.len())
            .body(Body::empty())
            .unwrap())
    }

    async fn serve_from_disk(
        &self,
        id: &str,
        filename: &str,
        req: Request,
        cached_etag: Option<String>,
    ) -> Result<Response> {
        let _guard = self.locks.acquire(id).await;

        let path = self.blob_path(id, filename).await;
        let meta = fs::metadata(&path).await?;

        // Buffer small files into the cache so the next GET is a memory
        // hit; larger files are streamed straight through so one blob
        // cannot dominate the byte ceiling.
        let mut etag = cached_etag;
        if meta.len() < self.small_file_limit {
            let data = fs::read(&path).await?;
            let tag = hex::encode(Sha256::digest(&data));
            self.cache
                .store(
                    id,
                    CachedBlob {
                        size: data.len() as u64,
                        data: Some(data),
                        content_type: content_type_for(filename),
                        etag: tag.clone(),
                        created_at: Utc::now(),
                    },
                )
                .await;
            etag = Some(tag);
        }

        debug!(id, size = meta.len(), "Serving blob from disk");
        let response = ServeFile::new(&path)
            .try_call(req)
            .await
            .map_err(BlobStoreError::from)?;

        let mut response = response.map(Body::new);
        if let Some(tag) = etag {
            set_etag(&mut response, &tag);
        }
        Ok(response)
    }
}

/// True when the request's If-None-Match header matches `etag`. Values
/// are compared with any surrounding quotes stripped, since the tag is
/// emitted unquoted.
fn if_none_match(req: &Request, etag: &str) -> bool {
    let Some(value) = req
        .headers()
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };

    value
        .split(',')
        .map(|tag| tag.trim().trim_matches('"'))
        .any(|tag| tag == etag || tag == "*")
}

fn not_modified_response(etag: &str) -> Response {
    let mut response = Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .body(Body::empty())
        .unwrap();
    set_etag(&mut response, etag);
    response
}

fn blob_response(content_type: &str, etag: &str, data: Vec<u8>) -> Response {
    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, data.len())
        .body(Body::from(data))
        .unwrap();
    set_etag(&mut response, etag);
    response
}

fn set_etag(response: &mut Response, etag: &str) {
    if let Ok(value) = HeaderValue::from_str(etag) {
        response.headers_mut().insert(header::ETAG, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlobStoreConfig;
    use std::path::Path;
    use tempfile::tempdir;

    async fn store_at(root: &Path) -> BlobStore {
        BlobStore::new(BlobStoreConfig {
            root: root.to_path_buf(),
            ..Default::default()
        })
        .await
        .unwrap()
    }

    fn request(method: Method) -> Request {
        Request::builder()
            .method(method)
            .uri("/")
            .body(Body::empty())
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path()).await;
        let saved = store.save("d1", "a.txt", &b"hello world"[..]).await.unwrap();

        let response = store.serve("d1", "a.txt", request(Method::GET)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        assert_eq!(
            response.headers()[header::ETAG].to_str().unwrap(),
            saved.etag
        );
        assert_eq!(body_bytes(response).await, b"hello world");
    }

    #[tokio::test]
    async fn test_get_below_threshold_populates_cache() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path()).await;
        let saved = store.save("d1", "a.txt", &b"small"[..]).await.unwrap();

        store.serve("d1", "a.txt", request(Method::GET)).await.unwrap();

        let entry = store.cache.get("d1").await.unwrap();
        assert_eq!(entry.data.as_deref(), Some(b"small".as_ref()));
        assert_eq!(entry.size, 5);
        assert_eq!(entry.etag, saved.etag);
    }

    #[tokio::test]
    async fn test_get_at_or_above_threshold_is_not_cached() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(BlobStoreConfig {
            root: dir.path().to_path_buf(),
            small_file_limit: 8,
            ..Default::default()
        })
        .await
        .unwrap();

        store.save("d1", "a.bin", &b"0123456789"[..]).await.unwrap();
        let response = store.serve("d1", "a.bin", request(Method::GET)).await.unwrap();
        assert_eq!(body_bytes(response).await, b"0123456789");

        // The metadata-only entry from the save remains; no bytes cached.
        let entry = store.cache.get("d1").await.unwrap();
        assert!(entry.data.is_none());
        assert_eq!(store.cache.stats().await.total_size, 0);
    }

    #[tokio::test]
    async fn test_second_get_is_a_cache_hit() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path()).await;
        store.save("d1", "a.txt", &b"cached bytes"[..]).await.unwrap();

        let first = store.serve("d1", "a.txt", request(Method::GET)).await.unwrap();
        assert_eq!(body_bytes(first).await, b"cached bytes");

        let hits_before = store.cache.stats().await.hits;
        let second = store.serve("d1", "a.txt", request(Method::GET)).await.unwrap();
        assert_eq!(body_bytes(second).await, b"cached bytes");
        assert!(store.cache.stats().await.hits > hits_before);
    }

    #[tokio::test]
    async fn test_head_after_save_uses_cached_metadata() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path()).await;
        let content = vec![0u8; 500_000];
        let saved = store.save("d1", "report.pdf", &content[..]).await.unwrap();

        let response = store
            .serve("d1", "report.pdf", request(Method::HEAD))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/pdf"
        );
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "500000");
        assert_eq!(
            response.headers()[header::ETAG].to_str().unwrap(),
            saved.etag
        );
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_head_falls_back_to_stat_without_cache() {
        let dir = tempdir().unwrap();
        {
            let store = store_at(dir.path()).await;
            store.save("d1", "a.txt", &b"on disk"[..]).await.unwrap();
        }

        // Fresh engine over the same root: empty cache, stat path only.
        let store = store_at(dir.path()).await;
        let response = store.serve("d1", "a.txt", request(Method::HEAD)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "7");
        assert!(response.headers().get(header::ETAG).is_none());
    }

    #[tokio::test]
    async fn test_get_missing_blob_is_not_found() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path()).await;

        let err = store.serve("ghost", "a.txt", request(Method::GET)).await;
        assert!(matches!(err, Err(BlobStoreError::NotFound)));

        let err = store.serve("ghost", "a.txt", request(Method::HEAD)).await;
        assert!(matches!(err, Err(BlobStoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_serve_after_delete_is_not_found() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path()).await;
        store.save("d1", "a.txt", &b"bytes"[..]).await.unwrap();
        store.delete("d1", "a.txt").await.unwrap();

        let err = store.serve("d1", "a.txt", request(Method::GET)).await;
        assert!(matches!(err, Err(BlobStoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_range_request_on_cached_entry() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path()).await;
        store.save("d1", "a.txt", &b"hello world"[..]).await.unwrap();

        // First GET buffers the bytes into the cache.
        let first = store.serve("d1", "a.txt", request(Method::GET)).await.unwrap();
        body_bytes(first).await;
        assert!(store.cache.get("d1").await.unwrap().data.is_some());

        // A ranged read must still get a partial response, not the full
        // cached body.
        let req = Request::builder()
            .method(Method::GET)
            .uri("/")
            .header(header::RANGE, "bytes=6-10")
            .body(Body::empty())
            .unwrap();
        let response = store.serve("d1", "a.txt", req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(body_bytes(response).await, b"world");
    }

    #[tokio::test]
    async fn test_if_none_match_on_cache_hit() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path()).await;
        let saved = store.save("d1", "a.txt", &b"cached"[..]).await.unwrap();

        let first = store.serve("d1", "a.txt", request(Method::GET)).await.unwrap();
        body_bytes(first).await;

        let req = Request::builder()
            .method(Method::GET)
            .uri("/")
            .header(header::IF_NONE_MATCH, saved.etag.clone())
            .body(Body::empty())
            .unwrap();
        let response = store.serve("d1", "a.txt", req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(
            response.headers()[header::ETAG].to_str().unwrap(),
            saved.etag
        );
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_large_get_carries_etag_from_save_metadata() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(BlobStoreConfig {
            root: dir.path().to_path_buf(),
            small_file_limit: 8,
            ..Default::default()
        })
        .await
        .unwrap();

        let saved = store.save("d1", "a.bin", &b"0123456789"[..]).await.unwrap();
        let response = store.serve("d1", "a.bin", request(Method::GET)).await.unwrap();

        assert_eq!(
            response.headers()[header::ETAG].to_str().unwrap(),
            saved.etag
        );
        assert_eq!(body_bytes(response).await, b"0123456789");
    }

    #[tokio::test]
    async fn test_range_request_on_disk_path() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path()).await;
        store.save("d1", "a.txt", &b"hello world"[..]).await.unwrap();

        let req = Request::builder()
            .method(Method::GET)
            .uri("/")
            .header(header::RANGE, "bytes=0-4")
            .body(Body::empty())
            .unwrap();

        let response = store.serve("d1", "a.txt", req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(body_bytes(response).await, b"hello");
    }
}
