//! HTTP/WS surface (§4.6, §6): routes every endpoint onto the Operation
//! Engine, Batch Coordinator, Rename Detector, and Real-time Fan-out.
//!
//! Each handler resolves a [`VaultHandle`] through [`AppState::registry`],
//! acquires `handle.writer_lock` for anything that mutates vault state, and
//! runs the actual git/sqlite I/O on the blocking thread pool via
//! [`tokio::task::spawn_blocking`] so it never stalls the async runtime
//! while the lock is held (§5 "Suspension points").

pub mod handlers;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::registry::VaultRegistry;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The process-wide vault registry.
    pub registry: Arc<VaultRegistry>,
}

/// Build the full router (§6 "External interfaces").
#[must_use]
pub fn router(registry: Arc<VaultRegistry>) -> Router {
    let state = AppState { registry };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ws/status", get(handlers::ws_status))
        .route("/vault/:vault/manifest", get(handlers::manifest))
        .route("/vault/:vault/status", get(handlers::status))
        .route("/vault/:vault/file/*path", get(handlers::read_file).delete(handlers::delete_file))
        .route("/vault/:vault/file-by-id/:id", get(handlers::read_file_by_id))
        .route("/vault/:vault/sync", post(handlers::sync))
        .route("/vault/:vault/sync/v2", post(handlers::sync_v2))
        .route("/vault/:vault/detect-rename", post(handlers::detect_rename))
        .route("/vault/:vault/rename", post(handlers::rename))
        .route("/vault/:vault/ws", get(ws::upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
