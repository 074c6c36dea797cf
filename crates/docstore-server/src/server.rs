//! HTTP server for the document storage endpoints
//!
//! Provides /health plus upload, serve, and delete under /docs/{id}/{filename}.
//! Routing, auth, and document metadata live with upstream collaborators;
//! this service only carries the id and filename through to the engine.

use crate::error::AppError;
use crate::types::{HealthResponse, UploadResponse};
use axum::extract::{Path, Request, State};
use axum::response::{Json, Response};
use axum::routing::{get, put};
use axum::Router;
use chrono::{DateTime, Utc};
use docstore_blobs::BlobStore;
use futures::TryStreamExt;
use std::sync::Arc;
use tokio_util::io::StreamReader;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared state for the HTTP server
pub struct ServerState {
    pub store: BlobStore,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(store: BlobStore) -> Self {
        Self {
            store,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/docs/{id}/{filename}",
            put(upload_doc).get(serve_doc).delete(delete_doc),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Path parameters are percent-decoded, so a crafted id or filename can
/// carry separators or a `..` component and point the engine outside its
/// storage root. Both must stay single, plain path segments.
fn validate_segments(id: &str, filename: &str) -> Result<(), AppError> {
    if is_safe_segment(id) && is_safe_segment(filename) {
        Ok(())
    } else {
        Err(AppError::BadRequest(
            "Invalid document id or filename".to_string(),
        ))
    }
}

fn is_safe_segment(value: &str) -> bool {
    !value.is_empty() && value != "." && value != ".." && !value.contains(['/', '\\'])
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let cache_stats = state.store.stats().await;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        cache: cache_stats,
    })
}

/// Upload a document body, streamed straight into the blob store
async fn upload_doc(
    State(state): State<SharedState>,
    Path((id, filename)): Path<(String, String)>,
    req: Request,
) -> Result<Json<UploadResponse>, AppError> {
    validate_segments(&id, &filename)?;

    let stream = req
        .into_body()
        .into_data_stream()
        .map_err(std::io::Error::other);
    let reader = StreamReader::new(stream);
    tokio::pin!(reader);

    let saved = state.store.save(&id, &filename, reader).await?;
    info!(id = %id, filename = %filename, size = saved.size, "Stored document");

    Ok(Json(UploadResponse {
        id,
        filename,
        size: saved.size,
        content_type: saved.content_type,
        etag: saved.etag,
    }))
}

/// Serve a document body (GET) or just its headers (HEAD)
async fn serve_doc(
    State(state): State<SharedState>,
    Path((id, filename)): Path<(String, String)>,
    req: Request,
) -> Result<Response, AppError> {
    validate_segments(&id, &filename)?;
    let response = state.store.serve(&id, &filename, req).await?;
    Ok(response)
}

/// Delete a document from disk and cache
async fn delete_doc(
    State(state): State<SharedState>,
    Path((id, filename)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    validate_segments(&id, &filename)?;
    state.store.delete(&id, &filename).await?;
    info!(id = %id, filename = %filename, "Deleted document");
    Ok(Json(serde_json::json!({ "status": "deleted" })))
}
