//! Batch Coordinator (§4.4): executes an ordered list of operations for one
//! vault under a single writer-lock acquisition.
//!
//! Callers (the `/vault/:v/sync/v2` handler) hold the vault's writer lock
//! for the whole call; this module assumes that and performs no locking of
//! its own, matching the Operation Engine's contract.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{self, OpResult};
use crate::error::VaultError;
use crate::registry::VaultHandle;

/// One operation's kind (§6 `Op.type`).
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// Create a new file at `path`.
    Create,
    /// Modify the file identified by `file_id`.
    Modify,
    /// Rename `old_path` to `path`, identified by `file_id`.
    Rename,
    /// Delete the file identified by `file_id`.
    Delete,
}

/// One element of a `/sync/v2` batch request (§6 `Op`).
#[derive(Clone, Debug, Deserialize)]
pub struct Op {
    /// What kind of operation this is.
    #[serde(rename = "type")]
    pub kind: OpKind,
    /// The operation's target path: the new file's path for `create`, or
    /// the destination path for `rename`.
    pub path: Option<String>,
    /// The file's stable identity, required for `modify`, `rename`, and
    /// `delete`.
    pub file_id: Option<Uuid>,
    /// The file's path before a `rename`.
    pub old_path: Option<String>,
    /// Base64-encoded content, required for `create` and `modify`, optional
    /// for `rename`.
    pub content: Option<String>,
    /// The commit the client last synced, for `modify`'s three-way merge.
    pub base_commit: Option<String>,
}

fn decode_content(content: Option<&str>) -> Result<Option<Vec<u8>>, VaultError> {
    content
        .map(|c| {
            base64::engine::general_purpose::STANDARD
                .decode(c)
                .map_err(|e| VaultError::validation(format!("invalid base64 content: {e}")))
        })
        .transpose()
}

fn require<'a>(value: Option<&'a str>, field: &str, op: &str) -> Result<&'a str, VaultError> {
    value.ok_or_else(|| VaultError::validation(format!("`{op}` op requires `{field}`")))
}

fn execute(handle: &VaultHandle, op: &Op) -> Result<OpResult, VaultError> {
    match op.kind {
        OpKind::Create => {
            let path = require(op.path.as_deref(), "path", "create")?;
            let content = decode_content(op.content.as_deref())?
                .ok_or_else(|| VaultError::validation("`create` op requires `content`"))?;
            engine::create(handle, path, &content)
        }
        OpKind::Modify => {
            let file_id = op.file_id.ok_or_else(|| VaultError::validation("`modify` op requires `file_id`"))?;
            let content = decode_content(op.content.as_deref())?
                .ok_or_else(|| VaultError::validation("`modify` op requires `content`"))?;
            engine::modify(handle, file_id, &content, op.base_commit.as_deref())
        }
        OpKind::Rename => {
            let file_id = op.file_id.ok_or_else(|| VaultError::validation("`rename` op requires `file_id`"))?;
            let old_path = require(op.old_path.as_deref(), "old_path", "rename")?;
            let new_path = require(op.path.as_deref(), "path", "rename")?;
            let content = decode_content(op.content.as_deref())?;
            engine::rename(handle, file_id, old_path, new_path, content.as_deref())
        }
        OpKind::Delete => {
            let file_id = op.file_id.ok_or_else(|| VaultError::validation("`delete` op requires `file_id`"))?;
            let (file_id, commit) = engine::delete(handle, file_id)?;
            Ok(OpResult { file_id, commit, hash: String::new(), merged: false, has_conflicts: false, merged_content: None })
        }
    }
}

/// One element of a `/sync/v2` batch response (§6 `OpResult`).
#[derive(Debug, Serialize)]
pub struct OpOutcome {
    /// This operation's position in the request array.
    pub index: usize,
    /// Whether this operation succeeded.
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_conflicts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OpOutcome {
    fn success(index: usize, result: OpResult) -> Self {
        Self {
            index,
            success: true,
            file_id: Some(result.file_id),
            commit: Some(result.commit),
            hash: Some(result.hash),
            merged: Some(result.merged),
            has_conflicts: Some(result.has_conflicts),
            merged_content: result
                .merged_content
                .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes)),
            error: None,
        }
    }

    fn failure(index: usize, error: &VaultError) -> Self {
        Self {
            index,
            success: false,
            file_id: None,
            commit: None,
            hash: None,
            merged: None,
            has_conflicts: None,
            merged_content: None,
            error: Some(error.to_string()),
        }
    }
}

/// The full `/sync/v2` response (§4.4 "Response shape").
#[derive(Debug, Serialize)]
pub struct BatchOutcome {
    /// `true` iff every operation succeeded (atomic mode: iff no operation
    /// failed before the batch stopped).
    pub success: bool,
    /// Per-operation results, in request order, truncated at the first
    /// failure in atomic mode.
    pub results: Vec<OpOutcome>,
    /// The vault's head after the batch. In atomic mode, equals the head
    /// before the batch if any operation failed (§4.4, §9 "known
    /// limitation": prior successful commits within the batch are not
    /// rolled back, only this reported value is reset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_commit: Option<String>,
}

fn current_head(handle: &VaultHandle) -> Option<String> {
    handle.content.head().ok().flatten().map(|h| h.to_string())
}

/// Execute `operations` against `handle` (§4.4). The caller must already
/// hold `handle.writer_lock`.
pub fn run(handle: &VaultHandle, operations: &[Op], atomic: bool) -> BatchOutcome {
    let start_commit = current_head(handle);
    let mut results = Vec::with_capacity(operations.len());
    let mut all_success = true;

    for (index, op) in operations.iter().enumerate() {
        match execute(handle, op) {
            Ok(result) => results.push(OpOutcome::success(index, result)),
            Err(e) => {
                all_success = false;
                results.push(OpOutcome::failure(index, &e));
                if atomic {
                    break;
                }
            }
        }
    }

    let head_commit = if atomic && !all_success { start_commit } else { current_head(handle) };
    BatchOutcome { success: all_success, results, head_commit }
}
