//!
//! filedock HTTP server
//! --------------------
//! This module defines the Axum-based HTTP API over the versioned file store.
//! The store itself lives in `storage`; everything here is routing glue that
//! supplies it with a bucket identifier (from the URL path), the requesting
//! peer address (for record attribution) and the uploaded payloads, then
//! translates store results and error kinds into JSON responses.
//!
//! Responsibilities:
//! - Multipart upload endpoints for single files and whole folder trees.
//! - Download, batch zip export, delete and clear endpoints.
//! - Version listing and restore endpoints.
//! - Startup configuration from environment variables.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use anyhow::Context;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::StoreError;
use crate::storage::{BundleItem, FileStore, IngestItem};

/// Shared server state injected into all handlers. `FileStore` is cheap to
/// clone and all clones share one bucket-lock registry.
#[derive(Clone)]
pub struct AppState {
    pub store: FileStore,
    pub data_root: String,
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "error": self.code_str(), "message": self.to_string() })))
            .into_response()
    }
}

fn log_startup_folders(data_root: &str) {
    let cwd = std::env::current_dir().ok();
    let exe = std::env::current_exe().ok();
    let root_exists = std::path::Path::new(data_root).exists();
    info!(
        target: "startup",
        "filedock starting. Folder configuration: cwd={:?}, exe={:?}, data_root='{}', data_root_exists={}",
        cwd, exe, data_root, root_exists
    );
}

/// Start the filedock HTTP server using environment configuration:
/// `FILEDOCK_HTTP_PORT` (default 7979), `FILEDOCK_DATA_ROOT` (default "data")
/// and `FILEDOCK_MAX_UPLOAD_BYTES` (default 256 MiB).
pub async fn run() -> anyhow::Result<()> {
    let http_port: u16 = std::env::var("FILEDOCK_HTTP_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(7979);
    let data_root = std::env::var("FILEDOCK_DATA_ROOT").unwrap_or_else(|_| "data".to_string());
    run_with_options(http_port, &data_root).await
}

pub async fn run_with_options(http_port: u16, data_root: &str) -> anyhow::Result<()> {
    // Print folder configuration as the very first thing on startup
    log_startup_folders(data_root);

    std::fs::create_dir_all(data_root)
        .with_context(|| format!("Failed to create or access data root: {}", data_root))?;
    let store = FileStore::new(data_root)
        .with_context(|| format!("While creating FileStore with root: {}", data_root))?;

    let max_upload: usize = std::env::var("FILEDOCK_MAX_UPLOAD_BYTES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(256 * 1024 * 1024);

    let app_state = AppState { store, data_root: data_root.to_string() };
    let app = router(app_state, max_upload);

    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

/// Build the route table. Split out of `run_with_options` so tests can mount
/// the API over a temp store without binding a socket.
pub fn router(app_state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/{bucket}/files", get(list_files))
        .route("/{bucket}/upload", post(upload_file))
        .route("/{bucket}/upload_folder", post(upload_folder))
        .route("/{bucket}/download/{name}", get(download_file))
        .route("/{bucket}/export", post(export_batch))
        .route("/{bucket}/versions/{name}", get(list_versions))
        .route("/{bucket}/restore/{name}", post(restore_version))
        .route("/{bucket}/delete/{name}", post(delete_file))
        .route("/{bucket}/clear", post(clear_bucket))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(app_state)
}

/// Liveness text; echoes the configured data root so an operator can tell
/// which store a running instance serves.
async fn liveness(State(state): State<AppState>) -> String {
    format!("filedock ok, data_root='{}'", state.data_root)
}

/// Ledger listing for a bucket: name -> { upload_time, origin }.
async fn list_files(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<impl IntoResponse, StoreError> {
    let files = state.store.load_ledger(&bucket)?;
    Ok(Json(files))
}

/// Read every `file`/`files` part of a multipart body into ingest items.
async fn collect_file_parts(multipart: &mut Multipart) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
    let mut out: Vec<(String, Vec<u8>)> = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| StoreError::io("<multipart>", std::io::Error::new(std::io::ErrorKind::Other, e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "file" | "files" => {
                let declared = field.file_name().unwrap_or("").to_string();
                // Unreadable byte stream mid-transfer aborts the whole body;
                // there is no way to resync a broken multipart stream.
                let bytes = field.bytes().await.map_err(|e| {
                    StoreError::io(
                        format!("<multipart:{}>", declared),
                        std::io::Error::new(std::io::ErrorKind::Other, e),
                    )
                })?;
                out.push((declared, bytes.to_vec()));
            }
            other => {
                tracing::warn!(target: "filedock::server", "ignoring unknown multipart field: '{}'", other);
            }
        }
    }
    Ok(out)
}

/// Ingest one or many individually named files.
async fn upload_file(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, StoreError> {
    let parts = collect_file_parts(&mut multipart).await?;
    let items: Vec<IngestItem> = parts
        .into_iter()
        .map(|(name, bytes)| IngestItem { name, bytes })
        .collect();
    let report = state.store.ingest(&bucket, items, &addr.ip().to_string())?;
    info!(
        target: "filedock::server",
        "upload: bucket='{}' stored={} failed={}",
        bucket, report.stored.len(), report.failed.len()
    );
    Ok(Json(report))
}

/// Bundle a folder tree (part filenames carry the relative paths) into one
/// zip artifact and ingest it.
async fn upload_folder(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, StoreError> {
    let parts = collect_file_parts(&mut multipart).await?;
    let items: Vec<BundleItem> = parts
        .into_iter()
        .map(|(rel_path, bytes)| BundleItem { rel_path, bytes })
        .collect();
    let stored = state.store.bundle_and_ingest(&bucket, items, &addr.ip().to_string())?;
    info!(target: "filedock::server", "upload_folder: bucket='{}' stored='{}'", bucket, stored);
    Ok(Json(json!({ "stored": stored })))
}

async fn download_file(
    State(state): State<AppState>,
    Path((bucket, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, StoreError> {
    let bytes = state.store.read_file(&bucket, &name)?;
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    if let Ok(v) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", name)) {
        headers.insert(header::CONTENT_DISPOSITION, v);
    }
    Ok((headers, bytes))
}

#[derive(Deserialize)]
struct ExportRequest {
    names: Vec<String>,
}

/// Pack a selection of current files into one zip download. Matched and
/// missing counts are echoed in headers so a zero-matched selection is
/// visible to the client.
async fn export_batch(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Json(req): Json<ExportRequest>,
) -> Result<impl IntoResponse, StoreError> {
    let result = state.store.export_batch(&bucket, &req.names)?;
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"export.zip\""),
    );
    if let Ok(v) = HeaderValue::from_str(&result.matched.len().to_string()) {
        headers.insert(HeaderName::from_static("x-export-matched"), v);
    }
    if let Ok(v) = HeaderValue::from_str(&result.missing.len().to_string()) {
        headers.insert(HeaderName::from_static("x-export-missing"), v);
    }
    Ok((headers, result.bytes))
}

async fn list_versions(
    State(state): State<AppState>,
    Path((bucket, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, StoreError> {
    let versions = state.store.list_versions(&bucket, &name)?;
    Ok(Json(versions))
}

#[derive(Deserialize)]
struct RestoreRequest {
    tag: String,
}

async fn restore_version(
    State(state): State<AppState>,
    Path((bucket, name)): Path<(String, String)>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<RestoreRequest>,
) -> Result<impl IntoResponse, StoreError> {
    state.store.restore(&bucket, &name, &req.tag, &addr.ip().to_string())?;
    info!(target: "filedock::server", "restore: bucket='{}' name='{}' tag='{}'", bucket, name, req.tag);
    Ok(Json(json!({ "restored": name, "tag": req.tag })))
}

async fn delete_file(
    State(state): State<AppState>,
    Path((bucket, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, StoreError> {
    state.store.delete(&bucket, &name)?;
    info!(target: "filedock::server", "delete: bucket='{}' name='{}'", bucket, name);
    Ok(Json(json!({ "deleted": name })))
}

async fn clear_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<impl IntoResponse, StoreError> {
    let removed = state.store.clear(&bucket)?;
    info!(target: "filedock::server", "clear: bucket='{}' removed={}", bucket, removed);
    Ok(Json(json!({ "cleared": removed })))
}
