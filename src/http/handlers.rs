//! Request handlers for the Sync API Surface (§6).
//!
//! Mutating handlers acquire `handle.writer_lock` and run the actual
//! Content/Identity Store work via [`tokio::task::spawn_blocking`]
//! ([`with_writer_lock`]); read-only handlers (`manifest`, `status`, `file`,
//! `file-by-id`, `detect-rename`) run without the lock, matching §5's
//! concurrent-reads-with-writers rule.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use super::AppState;
use crate::batch::{self, Op};
use crate::engine::{self, OpResult};
use crate::error::VaultError;
use crate::registry::VaultHandle;
use crate::rename_detector;

async fn with_writer_lock<T, F>(handle: &Arc<VaultHandle>, f: F) -> Result<T, VaultError>
where
    F: FnOnce(&VaultHandle) -> Result<T, VaultError> + Send + 'static,
    T: Send + 'static,
{
    let _permit = handle.writer_lock.lock().await;
    let task_handle = Arc::clone(handle);
    tokio::task::spawn_blocking(move || f(&task_handle))
        .await
        .map_err(|e| VaultError::fatal(format!("writer task panicked: {e}")))?
}

fn decode_base64(value: &str) -> Result<Vec<u8>, VaultError> {
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| VaultError::validation(format!("invalid base64 content: {e}")))
}

fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// `GET /health`.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /ws/status`.
pub async fn ws_status(State(state): State<AppState>) -> impl IntoResponse {
    let handles = state.registry.handles();
    let connected_vaults = handles.iter().filter(|h| !h.channels.is_empty()).count();
    let clients_by_vault: std::collections::HashMap<String, usize> =
        handles.iter().map(|h| (h.vault_name.clone(), h.channels.len())).collect();
    Json(serde_json::json!({
        "connected_vaults": connected_vaults,
        "clients_by_vault": clients_by_vault,
    }))
}

#[derive(Serialize)]
struct ManifestEntryResponse {
    file_id: Uuid,
    path: String,
    hash: Option<String>,
    commit: Option<String>,
    updated_at: i64,
}

#[derive(Serialize)]
struct ManifestResponse {
    files: Vec<ManifestEntryResponse>,
    head_commit: Option<String>,
}

/// `GET /vault/:v/manifest`.
pub async fn manifest(
    State(state): State<AppState>,
    Path(vault): Path<String>,
) -> Result<impl IntoResponse, VaultError> {
    let handle = state.registry.get_or_init(&vault)?;
    let files = handle
        .identity
        .all_active()?
        .into_iter()
        .map(|r| ManifestEntryResponse {
            file_id: r.file_id,
            path: r.current_path,
            hash: r.content_hash,
            commit: r.last_commit,
            updated_at: r.updated_at,
        })
        .collect();
    let head_commit = handle.content.head()?.map(|h| h.to_string());
    Ok(Json(ManifestResponse { files, head_commit }))
}

#[derive(Deserialize)]
pub struct StatusQuery {
    since: Option<String>,
}

#[derive(Serialize)]
struct StatusResponse {
    head_commit: Option<String>,
    changed_files: Vec<String>,
    has_changes: bool,
}

/// `GET /vault/:v/status?since=<c>`.
pub async fn status(
    State(state): State<AppState>,
    Path(vault): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, VaultError> {
    let handle = state.registry.get_or_init(&vault)?;
    let since = query
        .since
        .as_deref()
        .map(|s| s.parse().map_err(|e: vault_git::OidParseError| VaultError::validation(e.to_string())))
        .transpose()?;
    let (head_commit, changed_files) = handle.content.changed_since(since)?;
    let has_changes = !changed_files.is_empty();
    Ok(Json(StatusResponse { head_commit: head_commit.map(|h| h.to_string()), changed_files, has_changes }))
}

/// `GET /vault/:v/file/*path`.
pub async fn read_file(
    State(state): State<AppState>,
    Path((vault, path)): Path<(String, String)>,
) -> Result<impl IntoResponse, VaultError> {
    let handle = state.registry.get_or_init(&vault)?;
    let record = handle.identity.get_by_path(&path)?.ok_or_else(|| VaultError::not_found("file", path.clone()))?;
    let bytes = handle.content.read_current(&path)?.ok_or_else(|| VaultError::not_found("file", path.clone()))?;

    let mut headers = HeaderMap::new();
    if let Some(commit) = &record.last_commit {
        headers.insert("X-File-Commit", HeaderValue::from_str(commit).unwrap_or_else(|_| HeaderValue::from_static("")));
    }
    if let Some(hash) = &record.content_hash {
        headers.insert("X-File-Hash", HeaderValue::from_str(hash).unwrap_or_else(|_| HeaderValue::from_static("")));
    }
    Ok((StatusCode::OK, headers, bytes))
}

/// `GET /vault/:v/file-by-id/:id`.
pub async fn read_file_by_id(
    State(state): State<AppState>,
    Path((vault, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, VaultError> {
    let handle = state.registry.get_or_init(&vault)?;
    let file_id = id.parse::<Uuid>().map_err(|e| VaultError::validation(format!("invalid file_id: {e}")))?;
    let record = handle.identity.get_by_id(file_id)?.ok_or_else(|| VaultError::not_found("file_id", id.clone()))?;
    let bytes = handle
        .content
        .read_current(&record.current_path)?
        .ok_or_else(|| VaultError::not_found("file_id", id.clone()))?;

    let mut headers = HeaderMap::new();
    headers.insert("X-File-Id", HeaderValue::from_str(&file_id.to_string()).unwrap_or_else(|_| HeaderValue::from_static("")));
    headers.insert(
        "X-File-Path",
        HeaderValue::from_str(&record.current_path).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    if let Some(commit) = &record.last_commit {
        headers.insert("X-File-Commit", HeaderValue::from_str(commit).unwrap_or_else(|_| HeaderValue::from_static("")));
    }
    if let Some(hash) = &record.content_hash {
        headers.insert("X-File-Hash", HeaderValue::from_str(hash).unwrap_or_else(|_| HeaderValue::from_static("")));
    }
    Ok((StatusCode::OK, headers, bytes))
}

#[derive(Deserialize)]
pub struct SyncRequest {
    path: String,
    content: String,
    base_commit: Option<String>,
}

#[derive(Serialize)]
struct SyncResponse {
    success: bool,
    file_id: Uuid,
    commit: String,
    hash: String,
    merged: bool,
    has_conflicts: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    merged_content: Option<String>,
}

impl From<OpResult> for SyncResponse {
    fn from(r: OpResult) -> Self {
        Self {
            success: !r.has_conflicts,
            file_id: r.file_id,
            commit: r.commit,
            hash: r.hash,
            merged: r.merged,
            has_conflicts: r.has_conflicts,
            merged_content: r.merged_content.map(|b| encode_base64(&b)),
        }
    }
}

/// `POST /vault/:v/sync`.
#[instrument(skip_all, fields(vault, path = %req.path))]
pub async fn sync(
    State(state): State<AppState>,
    Path(vault): Path<String>,
    Json(req): Json<SyncRequest>,
) -> Result<impl IntoResponse, VaultError> {
    let handle = state.registry.get_or_init(&vault)?;
    let bytes = decode_base64(&req.content)?;
    let result = with_writer_lock(&handle, move |h| engine::sync(h, &req.path, &bytes, req.base_commit.as_deref())).await?;
    Ok(Json(SyncResponse::from(result)))
}

#[derive(Deserialize)]
pub struct SyncV2Request {
    operations: Vec<Op>,
    #[serde(default = "default_atomic")]
    atomic: bool,
}

fn default_atomic() -> bool {
    true
}

/// `POST /vault/:v/sync/v2`.
///
/// An atomic batch that fails partway returns HTTP 400 alongside the partial
/// `results` (§8 S6); a non-atomic batch always reports 200 since partial
/// per-operation failure is its normal, expected outcome (§4.4).
#[instrument(skip_all, fields(vault, op_count = req.operations.len(), atomic = req.atomic))]
pub async fn sync_v2(
    State(state): State<AppState>,
    Path(vault): Path<String>,
    Json(req): Json<SyncV2Request>,
) -> Result<impl IntoResponse, VaultError> {
    if req.operations.is_empty() {
        return Err(VaultError::validation("empty operation set"));
    }
    let handle = state.registry.get_or_init(&vault)?;
    let atomic = req.atomic;
    let outcome = with_writer_lock(&handle, move |h| Ok(batch::run(h, &req.operations, req.atomic))).await?;
    let status = if atomic && !outcome.success { StatusCode::BAD_REQUEST } else { StatusCode::OK };
    Ok((status, Json(outcome)))
}

#[derive(Deserialize)]
pub struct DetectRenameRequest {
    missing_path: String,
    missing_hash: String,
    file_id: Option<Uuid>,
}

#[derive(Serialize)]
struct DetectRenameResponse {
    found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detection_method: Option<rename_detector::DetectionMethod>,
}

/// `POST /vault/:v/detect-rename`.
pub async fn detect_rename(
    State(state): State<AppState>,
    Path(vault): Path<String>,
    Json(req): Json<DetectRenameRequest>,
) -> Result<impl IntoResponse, VaultError> {
    let handle = state.registry.get_or_init(&vault)?;
    let detection = rename_detector::detect(&handle.identity, &req.missing_path, &req.missing_hash, req.file_id)?;
    Ok(Json(DetectRenameResponse {
        found: detection.found,
        new_path: detection.new_path,
        file_id: detection.file_id,
        detection_method: detection.method,
    }))
}

#[derive(Deserialize)]
pub struct RenameRequest {
    file_id: Uuid,
    old_path: String,
    new_path: String,
    content: Option<String>,
}

#[derive(Serialize)]
struct RenameResponse {
    success: bool,
    file_id: Uuid,
    commit: String,
    hash: String,
}

/// `POST /vault/:v/rename`.
#[instrument(skip_all, fields(vault, file_id = %req.file_id, old_path = %req.old_path, new_path = %req.new_path))]
pub async fn rename(
    State(state): State<AppState>,
    Path(vault): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<impl IntoResponse, VaultError> {
    let handle = state.registry.get_or_init(&vault)?;
    let content = req.content.as_deref().map(decode_base64).transpose()?;
    let result = with_writer_lock(&handle, move |h| {
        engine::rename(h, req.file_id, &req.old_path, &req.new_path, content.as_deref())
    })
    .await?;
    Ok(Json(RenameResponse { success: true, file_id: result.file_id, commit: result.commit, hash: result.hash }))
}

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
    commit: String,
}

/// `DELETE /vault/:v/file/*path`.
#[instrument(skip_all, fields(vault, path = %path))]
pub async fn delete_file(
    State(state): State<AppState>,
    Path((vault, path)): Path<(String, String)>,
) -> Result<impl IntoResponse, VaultError> {
    let handle = state.registry.get_or_init(&vault)?;
    let record = handle.identity.get_by_path(&path)?.ok_or_else(|| VaultError::not_found("file", path.clone()))?;
    let (_, commit) = with_writer_lock(&handle, move |h| engine::delete(h, record.file_id)).await?;
    Ok(Json(DeleteResponse { success: true, commit }))
}
