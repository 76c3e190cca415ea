//! Operation Engine (§4.3): resolves one logical sync operation against a
//! vault's current head and commits the Content Store, Identity Store, and
//! disaster-recovery manifest together.
//!
//! Every function here assumes its caller already holds the vault's
//! [`writer_lock`](crate::registry::VaultHandle::writer_lock) — the engine
//! itself performs no locking, so the Batch Coordinator (§4.4) can call
//! these functions repeatedly under a single lock acquisition per batch.

use tracing::instrument;
use uuid::Uuid;
use vault_git::GitOid;

use crate::content_store::merge::merge;
use crate::content_store::{self, Edit};
use crate::error::VaultError;
use crate::identity_store::{self, IdentityUpdate};
use crate::registry::VaultHandle;

/// The outcome of a single resolved operation (§4.3, §6 `OpResult`).
#[derive(Debug, Clone)]
pub struct OpResult {
    /// The logical file's stable identity.
    pub file_id: Uuid,
    /// The commit produced by this operation, or the unchanged head if the
    /// operation was a no-op or hit a mergeable conflict.
    pub commit: String,
    /// SHA-256 of the file's bytes after this operation.
    pub hash: String,
    /// `true` if a three-way merge was performed (clean or conflicting).
    pub merged: bool,
    /// `true` if the three-way merge left conflict markers and was not
    /// committed.
    pub has_conflicts: bool,
    /// The bytes with conflict markers, present only when `has_conflicts`.
    pub merged_content: Option<Vec<u8>>,
}

fn parse_commit(commit: &str) -> Result<GitOid, VaultError> {
    commit.parse().map_err(|e: vault_git::OidParseError| VaultError::validation(e.to_string()))
}

/// Rebuild and append the disaster-recovery manifest to `edits`, then commit
/// the whole batch as one commit (§3 invariant 6: the manifest is updated
/// atomically with the vault history).
fn commit_with_manifest(handle: &VaultHandle, mut edits: Vec<Edit>, message: &str) -> Result<GitOid, VaultError> {
    let manifest = identity_store::manifest::build(&handle.identity)?;
    edits.push(Edit::Write { path: content_store::MANIFEST_PATH.to_owned(), bytes: identity_store::manifest::to_bytes(&manifest)? });
    handle.content.commit_edits(edits, message)
}

/// **Create(path, bytes)** — §4.3.
///
/// Fails with [`VaultError::Conflict`] if a non-deleted file already exists
/// at `path`.
#[instrument(skip_all, fields(vault = %handle.vault_name, path = %path))]
pub fn create(handle: &VaultHandle, path: &str, bytes: &[u8]) -> Result<OpResult, VaultError> {
    if handle.identity.get_by_path(path)?.is_some() {
        return Err(VaultError::conflict("create", path.to_owned(), "a file already exists at this path"));
    }
    if content_store::is_reserved(path) {
        return Err(VaultError::validation(format!("`{path}` is a reserved path")));
    }

    let file_id = handle.identity.ensure_file_id(path, None, None)?;
    let hash = content_store::content_hash(bytes);
    let commit = commit_with_manifest(
        handle,
        vec![Edit::Write { path: path.to_owned(), bytes: bytes.to_vec() }],
        &format!("create {path}"),
    )?;
    handle.identity.update(file_id, IdentityUpdate { current_path: None, hash: Some(&hash), commit: Some(&commit.to_string()) })?;

    Ok(OpResult { file_id, commit: commit.to_string(), hash, merged: false, has_conflicts: false, merged_content: None })
}

/// **Modify(file_id, bytes, base_commit?)** — §4.3.
#[instrument(skip_all, fields(vault = %handle.vault_name, file_id = %file_id, base_commit))]
pub fn modify(handle: &VaultHandle, file_id: Uuid, bytes: &[u8], base_commit: Option<&str>) -> Result<OpResult, VaultError> {
    let record = handle
        .identity
        .get_by_id(file_id)?
        .ok_or_else(|| VaultError::not_found("file_id", file_id.to_string()))?;
    let path = record.current_path.clone();
    let hash = content_store::content_hash(bytes);

    let server_bytes = handle.content.read_current(&path)?;
    let Some(server_bytes) = server_bytes else {
        // Deleted server-side (§4.3 "recreates it").
        let commit = commit_with_manifest(
            handle,
            vec![Edit::Write { path: path.clone(), bytes: bytes.to_vec() }],
            &format!("recreate {path}"),
        )?;
        handle.identity.update(file_id, IdentityUpdate { current_path: None, hash: Some(&hash), commit: Some(&commit.to_string()) })?;
        return Ok(OpResult { file_id, commit: commit.to_string(), hash, merged: false, has_conflicts: false, merged_content: None });
    };

    let head = handle.content.head()?;
    if let Some(base) = base_commit
        && Some(parse_commit(base)?) == head
    {
        let commit = commit_with_manifest(
            handle,
            vec![Edit::Write { path: path.clone(), bytes: bytes.to_vec() }],
            &format!("modify {path}"),
        )?;
        handle.identity.update(file_id, IdentityUpdate { current_path: None, hash: Some(&hash), commit: Some(&commit.to_string()) })?;
        return Ok(OpResult { file_id, commit: commit.to_string(), hash, merged: false, has_conflicts: false, merged_content: None });
    }

    if hash == content_store::content_hash(&server_bytes) {
        let commit = record.last_commit.clone().or_else(|| head.map(|h| h.to_string())).unwrap_or_default();
        return Ok(OpResult { file_id, commit, hash, merged: false, has_conflicts: false, merged_content: None });
    }

    let base_bytes = match base_commit {
        Some(base) => handle.content.read_at(parse_commit(base)?, &path)?.unwrap_or_else(|| server_bytes.clone()),
        None => server_bytes.clone(),
    };
    let outcome = merge(&base_bytes, bytes, &server_bytes);

    if outcome.has_conflicts {
        let unchanged = head.map(|h| h.to_string()).unwrap_or_default();
        return Ok(OpResult {
            file_id,
            commit: unchanged,
            hash: content_store::content_hash(&outcome.bytes),
            merged: true,
            has_conflicts: true,
            merged_content: Some(outcome.bytes),
        });
    }

    let merged_hash = content_store::content_hash(&outcome.bytes);
    let commit = commit_with_manifest(
        handle,
        vec![Edit::Write { path: path.clone(), bytes: outcome.bytes }],
        &format!("merge {path}"),
    )?;
    handle.identity.update(file_id, IdentityUpdate { current_path: None, hash: Some(&merged_hash), commit: Some(&commit.to_string()) })?;
    Ok(OpResult { file_id, commit: commit.to_string(), hash: merged_hash, merged: true, has_conflicts: false, merged_content: None })
}

/// **Rename(file_id, old_path, new_path, bytes?)** — §4.3.
#[instrument(skip_all, fields(vault = %handle.vault_name, file_id = %file_id, old_path = %old_path, new_path = %new_path))]
pub fn rename(
    handle: &VaultHandle,
    file_id: Uuid,
    old_path: &str,
    new_path: &str,
    bytes: Option<&[u8]>,
) -> Result<OpResult, VaultError> {
    let record = handle
        .identity
        .get_by_id(file_id)?
        .ok_or_else(|| VaultError::not_found("file_id", file_id.to_string()))?;
    if record.current_path != old_path {
        return Err(VaultError::conflict(
            "rename",
            file_id.to_string(),
            format!("current path is `{}`, not `{old_path}`", record.current_path),
        ));
    }
    if content_store::is_reserved(new_path) {
        return Err(VaultError::validation(format!("`{new_path}` is a reserved path")));
    }

    // Path history is recorded before `current_path` is updated, in the
    // same critical section (§3 invariant 5).
    handle.identity.record_path_change(file_id, old_path, new_path)?;
    let hash = bytes.map(content_store::content_hash);
    handle.identity.update(
        file_id,
        IdentityUpdate { current_path: Some(new_path), hash: hash.as_deref(), commit: None },
    )?;

    let mut edits = vec![Edit::Remove { path: old_path.to_owned() }];
    match bytes {
        Some(b) => edits.push(Edit::Write { path: new_path.to_owned(), bytes: b.to_vec() }),
        None => {
            let oid = handle
                .content
                .current_blob_oid(old_path)?
                .ok_or_else(|| VaultError::not_found("file", old_path.to_owned()))?;
            edits.push(Edit::Reuse { path: new_path.to_owned(), oid });
        }
    }

    let commit = commit_with_manifest(handle, edits, &format!("rename {old_path} -> {new_path}"))?;
    handle.identity.update(file_id, IdentityUpdate { current_path: None, hash: None, commit: Some(&commit.to_string()) })?;

    let final_hash = hash.unwrap_or_else(|| record.content_hash.unwrap_or_default());
    Ok(OpResult { file_id, commit: commit.to_string(), hash: final_hash, merged: false, has_conflicts: false, merged_content: None })
}

/// **Delete(file_id)** — §4.3.
#[instrument(skip_all, fields(vault = %handle.vault_name, file_id = %file_id))]
pub fn delete(handle: &VaultHandle, file_id: Uuid) -> Result<(Uuid, String), VaultError> {
    let record = handle
        .identity
        .get_by_id(file_id)?
        .ok_or_else(|| VaultError::not_found("file_id", file_id.to_string()))?;

    // Soft-delete before building the manifest so it excludes this file
    // (§3 invariant 6).
    handle.identity.soft_delete(file_id)?;
    let commit = commit_with_manifest(
        handle,
        vec![Edit::Remove { path: record.current_path.clone() }],
        &format!("delete {}", record.current_path),
    )?;
    Ok((file_id, commit.to_string()))
}

/// The single-file sync endpoint's derived procedure (§4.3, §6
/// `POST /vault/:v/sync`): create-if-absent, else resolve via [`modify`].
#[instrument(skip_all, fields(vault = %handle.vault_name, path = %path, base_commit))]
pub fn sync(handle: &VaultHandle, path: &str, bytes: &[u8], base_commit: Option<&str>) -> Result<OpResult, VaultError> {
    match handle.identity.get_by_path(path)? {
        None => create(handle, path, bytes),
        Some(record) => modify(handle, record.file_id, bytes, base_commit),
    }
}

/// Commit a CRDT-materialized file at `file_id`, creating the identity
/// record at `path` if this is the first time the server has seen it (a
/// file introduced purely over the real-time channel, before any HTTP
/// create) — used only by [`Applier::apply_materialized_text`].
fn create_at_known_id(handle: &VaultHandle, file_id: Uuid, path: &str, bytes: &[u8]) -> Result<(), VaultError> {
    handle.identity.insert_recovered(file_id, path, crate::time::now_secs())?;
    let hash = content_store::content_hash(bytes);
    let commit = commit_with_manifest(handle, vec![Edit::Write { path: path.to_owned(), bytes: bytes.to_vec() }], &format!("create {path}"))?;
    handle.identity.update(file_id, IdentityUpdate { current_path: None, hash: Some(&hash), commit: Some(&commit.to_string()) })?;
    Ok(())
}

impl crate::realtime::Applier for VaultHandle {
    #[instrument(skip_all, fields(vault = %self.vault_name, file_id = %file_id))]
    fn apply_materialized_text(&self, file_id: Uuid, text: &str) -> Result<(), VaultError> {
        if self.identity.get_by_id(file_id)?.is_some() {
            modify(self, file_id, text.as_bytes(), None)?;
            return Ok(());
        }
        // First time this file_id has been committed through the HTTP
        // surface: derive its path from the structure CRDT's entry, if the
        // peer already announced one.
        let path = self
            .structure_crdt
            .materialize()
            .get(&file_id)
            .map(|entry| entry.path.clone())
            .ok_or_else(|| VaultError::not_found("file_id", file_id.to_string()))?;
        create_at_known_id(self, file_id, &path, text.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::structure::StructureCrdtStore;
    use crate::crdt::text::TextCrdtStore;
    use crate::identity_store::IdentityStore;
    use crate::realtime::ChannelTable;
    use tokio::sync::Mutex as AsyncMutex;
    use vault_git::GixVaultRepo;

    fn handle() -> (tempfile::TempDir, VaultHandle) {
        let dir = tempfile::tempdir().unwrap();
        let repo = GixVaultRepo::open(dir.path()).unwrap();
        let content = content_store::ContentStore::new(Box::new(repo));
        content.init().unwrap();
        let handle = VaultHandle {
            vault_name: "test".to_owned(),
            writer_lock: AsyncMutex::new(()),
            content,
            identity: IdentityStore::open_in_memory().unwrap(),
            text_crdt: TextCrdtStore::default(),
            structure_crdt: StructureCrdtStore::default(),
            channels: ChannelTable::default(),
        };
        (dir, handle)
    }

    #[test]
    fn create_then_create_again_conflicts() {
        let (_dir, handle) = handle();
        create(&handle, "n.md", b"hello").unwrap();
        let err = create(&handle, "n.md", b"hello again").unwrap_err();
        assert!(matches!(err, VaultError::Conflict { .. }));
    }

    #[test]
    fn fast_forward_modify_advances_head() {
        let (_dir, handle) = handle();
        let c1 = create(&handle, "n.md", b"hello").unwrap();
        let c2 = modify(&handle, c1.file_id, b"hello world", Some(&c1.commit)).unwrap();
        assert_ne!(c1.commit, c2.commit);
        assert!(!c2.merged);
        assert_eq!(handle.content.read_current("n.md").unwrap().unwrap(), b"hello world");
    }

    #[test]
    fn idempotent_modify_is_a_noop() {
        let (_dir, handle) = handle();
        let c1 = create(&handle, "n.md", b"hello").unwrap();
        let c2 = modify(&handle, c1.file_id, b"hello", None).unwrap();
        assert_eq!(c1.commit, c2.commit);
        assert!(!c2.merged);
        assert!(!c2.has_conflicts);
    }

    #[test]
    fn non_conflicting_merge_combines_both_edits() {
        let (_dir, handle) = handle();
        let c1 = create(&handle, "n.md", b"Line 1\nLine 2\nLine 3").unwrap();
        modify(&handle, c1.file_id, b"Line 1 - A edited\nLine 2\nLine 3", Some(&c1.commit)).unwrap();
        let result = modify(&handle, c1.file_id, b"Line 1\nLine 2\nLine 3 - B edited", Some(&c1.commit)).unwrap();
        assert!(result.merged);
        assert!(!result.has_conflicts);
        let text = String::from_utf8(handle.content.read_current("n.md").unwrap().unwrap()).unwrap();
        assert!(text.contains("Line 1 - A edited"));
        assert!(text.contains("Line 3 - B edited"));
    }

    #[test]
    fn conflicting_merge_does_not_advance_head() {
        let (_dir, handle) = handle();
        let c1 = create(&handle, "n.md", b"Original line").unwrap();
        let after_a = modify(&handle, c1.file_id, b"A edited this line", Some(&c1.commit)).unwrap();
        let result = modify(&handle, c1.file_id, b"B edited this line", Some(&c1.commit)).unwrap();
        assert!(result.has_conflicts);
        assert_eq!(result.commit, after_a.commit);
        let merged = result.merged_content.unwrap();
        let text = String::from_utf8(merged).unwrap();
        assert!(text.contains("<<<<<<<"));
        assert!(text.contains("======="));
        assert!(text.contains(">>>>>>>"));
    }

    #[test]
    fn rename_preserves_file_id_and_content() {
        let (_dir, handle) = handle();
        let c1 = create(&handle, "old.md", b"content").unwrap();
        let result = rename(&handle, c1.file_id, "old.md", "new.md", None).unwrap();
        assert_eq!(result.file_id, c1.file_id);
        assert!(handle.identity.get_by_path("old.md").unwrap().is_none());
        let record = handle.identity.get_by_path("new.md").unwrap().unwrap();
        assert_eq!(record.file_id, c1.file_id);
        assert_eq!(handle.content.read_current("new.md").unwrap().unwrap(), b"content");
    }

    #[test]
    fn rename_rejects_stale_old_path() {
        let (_dir, handle) = handle();
        let c1 = create(&handle, "old.md", b"content").unwrap();
        rename(&handle, c1.file_id, "old.md", "new.md", None).unwrap();
        let err = rename(&handle, c1.file_id, "old.md", "third.md", None).unwrap_err();
        assert!(matches!(err, VaultError::Conflict { .. }));
    }

    #[test]
    fn delete_soft_deletes_and_removes_content() {
        let (_dir, handle) = handle();
        let c1 = create(&handle, "a.md", b"a").unwrap();
        delete(&handle, c1.file_id).unwrap();
        assert!(handle.identity.get_by_path("a.md").unwrap().is_none());
        assert!(handle.content.read_current("a.md").unwrap().is_none());
        assert!(handle.identity.get_by_id(c1.file_id).unwrap().is_none());
    }

    #[test]
    fn sync_creates_when_path_absent_then_fast_forwards() {
        let (_dir, handle) = handle();
        let r1 = sync(&handle, "n.md", b"hello", None).unwrap();
        assert!(!r1.merged);
        let r2 = sync(&handle, "n.md", b"hello world", Some(&r1.commit)).unwrap();
        assert_ne!(r1.commit, r2.commit);
    }
}
