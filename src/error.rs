//! Unified error type for the vault sync server.
//!
//! Defines [`VaultError`], the error type returned by the Operation Engine,
//! Batch Coordinator, Rename Detector, Content Store, and Identity Store.
//! Each variant is rich enough for the HTTP layer (`http::handlers`) to pick
//! a status code without string-matching (§7).
//!
//! No internal filesystem path outside the vault root is ever embedded in a
//! displayed message (§7 "User-visible failure text").

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors surfaced by vault sync operations.
#[derive(Debug)]
pub enum VaultError {
    /// Malformed vault name, missing required field, unknown op type,
    /// decoded content too large. Maps to HTTP 400.
    Validation {
        /// What failed validation.
        detail: String,
    },

    /// Unknown path, unknown `file_id`, deleted record. Maps to HTTP 404.
    NotFound {
        /// The operation kind, e.g. `"file"`, `"file_id"`.
        kind: &'static str,
        /// The offending identifier (path or file_id).
        identifier: String,
    },

    /// Create at an existing path, or a rename whose recorded `current_path`
    /// does not match the caller's `old_path`, or an ambiguous rename
    /// detection. Maps to HTTP 400.
    Conflict {
        /// The operation kind, e.g. `"create"`, `"rename"`.
        kind: &'static str,
        /// The offending identifier (path or file_id).
        identifier: String,
        /// Human-readable explanation.
        detail: String,
    },

    /// A failure in the Content Store (git backend), Identity Store (sqlite),
    /// or CRDT persistence layer. Maps to HTTP 500. The operation that raised
    /// this leaves no partial state.
    Fatal {
        /// Freeform description; never includes a path outside the vault.
        detail: String,
    },
}

impl VaultError {
    /// Build a [`VaultError::Validation`] from a message.
    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation { detail: detail.into() }
    }

    /// Build a [`VaultError::NotFound`].
    pub fn not_found(kind: &'static str, identifier: impl Into<String>) -> Self {
        Self::NotFound { kind, identifier: identifier.into() }
    }

    /// Build a [`VaultError::Conflict`].
    pub fn conflict(kind: &'static str, identifier: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Conflict { kind, identifier: identifier.into(), detail: detail.into() }
    }

    /// Build a [`VaultError::Fatal`].
    pub fn fatal(detail: impl Into<String>) -> Self {
        Self::Fatal { detail: detail.into() }
    }
}

impl std::fmt::Display for VaultError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation { detail } => write!(f, "validation error: {detail}"),
            Self::NotFound { kind, identifier } => write!(f, "{kind} not found: {identifier}"),
            Self::Conflict { kind, identifier, detail } => {
                write!(f, "{kind} conflict on {identifier}: {detail}")
            }
            Self::Fatal { detail } => write!(f, "internal error: {detail}"),
        }
    }
}

impl std::error::Error for VaultError {}

impl From<vault_git::GitError> for VaultError {
    fn from(e: vault_git::GitError) -> Self {
        Self::fatal(e.to_string())
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        Self::fatal(format!("identity store error: {e}"))
    }
}

impl IntoResponse for VaultError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            Self::Validation { detail } => (StatusCode::BAD_REQUEST, detail.clone()),
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Conflict { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::Fatal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };
        (status, Json(json!({ "error": error }))).into_response()
    }
}
