//! `gix`-backed object read/write, tree editing, and recursive tree walks.

use std::collections::BTreeMap;

use crate::error::GitError;
use crate::gix_repo::{GixVaultRepo, HEAD_REF, from_gix_entry_mode, from_gix_oid, to_gix_entry_kind, to_gix_oid};
use crate::types::*;

pub fn read_blob(repo: &GixVaultRepo, oid: GitOid) -> Result<Vec<u8>, GitError> {
    let mut blob = repo
        .repo
        .find_blob(to_gix_oid(oid))
        .map_err(|e| GitError::NotFound {
            message: format!("blob {oid}: {e}"),
        })?;
    Ok(blob.take_data())
}

pub fn read_tree(repo: &GixVaultRepo, oid: GitOid) -> Result<Vec<TreeEntry>, GitError> {
    let tree = repo
        .repo
        .find_tree(to_gix_oid(oid))
        .map_err(|e| GitError::NotFound {
            message: format!("tree {oid}: {e}"),
        })?;

    let mut entries = Vec::new();
    for result in tree.iter() {
        let entry = result.map_err(|e| GitError::BackendError {
            message: format!("failed to decode tree entry: {e}"),
        })?;
        entries.push(TreeEntry {
            name: entry.inner.filename.to_string(),
            mode: from_gix_entry_mode(entry.inner.mode),
            oid: from_gix_oid(entry.inner.oid),
        });
    }
    Ok(entries)
}

pub fn read_commit(repo: &GixVaultRepo, oid: GitOid) -> Result<CommitInfo, GitError> {
    let commit = repo
        .repo
        .find_commit(to_gix_oid(oid))
        .map_err(|e| GitError::NotFound {
            message: format!("commit {oid}: {e}"),
        })?;
    let decoded = commit.decode().map_err(|e| GitError::BackendError {
        message: format!("failed to decode commit {oid}: {e}"),
    })?;
    Ok(CommitInfo {
        tree_oid: from_gix_oid(decoded.tree()),
        parents: decoded.parents().map(from_gix_oid).collect(),
        message: decoded.message.to_string(),
    })
}

pub fn write_blob(repo: &GixVaultRepo, data: &[u8]) -> Result<GitOid, GitError> {
    let id = repo
        .repo
        .write_blob(data)
        .map_err(|e| GitError::BackendError {
            message: format!("failed to write blob: {e}"),
        })?;
    Ok(from_gix_oid(id.detach()))
}

/// Apply `edits` (each keyed by a full slash-separated path) against `base`.
///
/// `gix`'s tree editor accepts nested paths directly (creating or pruning
/// intermediate subtrees as needed), so no manual path-splitting is required.
pub fn edit_tree(
    repo: &GixVaultRepo,
    base: Option<GitOid>,
    edits: &[TreeEdit],
) -> Result<GitOid, GitError> {
    let mut editor = match base {
        Some(oid) => {
            let tree = repo
                .repo
                .find_tree(to_gix_oid(oid))
                .map_err(|e| GitError::NotFound {
                    message: format!("base tree {oid}: {e}"),
                })?;
            tree.edit().map_err(|e| GitError::BackendError {
                message: format!("failed to create tree editor: {e}"),
            })?
        }
        None => {
            let empty = gix::objs::Tree { entries: Vec::new() };
            let empty_id = repo
                .repo
                .write_object(&empty)
                .map_err(|e| GitError::BackendError {
                    message: format!("failed to write empty tree: {e}"),
                })?;
            let tree = repo
                .repo
                .find_tree(empty_id)
                .map_err(|e| GitError::BackendError {
                    message: format!("failed to reopen empty tree: {e}"),
                })?;
            tree.edit().map_err(|e| GitError::BackendError {
                message: format!("failed to create tree editor: {e}"),
            })?
        }
    };

    for edit in edits {
        match edit {
            TreeEdit::Upsert { path, mode, oid } => {
                editor
                    .upsert(path.as_str(), to_gix_entry_kind(*mode), to_gix_oid(*oid))
                    .map_err(|e| GitError::BackendError {
                        message: format!("tree edit upsert '{path}': {e}"),
                    })?;
            }
            TreeEdit::Remove { path } => {
                editor.remove(path.as_str()).map_err(|e| GitError::BackendError {
                    message: format!("tree edit remove '{path}': {e}"),
                })?;
            }
        }
    }

    let new_id = editor.write().map_err(|e| GitError::BackendError {
        message: format!("failed to write edited tree: {e}"),
    })?;
    Ok(from_gix_oid(new_id.detach()))
}

pub fn create_commit(
    repo: &GixVaultRepo,
    tree: GitOid,
    parents: &[GitOid],
    message: &str,
) -> Result<GitOid, GitError> {
    let tree_oid = to_gix_oid(tree);
    let parent_oids: Vec<gix::ObjectId> = parents.iter().map(|p| to_gix_oid(*p)).collect();

    // A fixed identity: this is a single-process self-hosted server, not a
    // multi-author git history; the "author" is always the vault sync server
    // itself. Per-device attribution lives in the commit message.
    let signature = gix::actor::SignatureRef {
        name: "vault-sync".into(),
        email: "vault-sync@localhost".into(),
        time: gix::date::Time::now_local_or_utc().into(),
    };

    let id = repo
        .repo
        .commit_as(signature, signature, HEAD_REF, message, tree_oid, parent_oids)
        .map_err(|e| GitError::BackendError {
            message: format!("failed to create commit: {e}"),
        })?;
    Ok(from_gix_oid(id.detach()))
}

/// Recursively walk `tree` and collect every blob path, depth-first,
/// slash-joined relative to the tree root.
pub fn list_blobs(repo: &GixVaultRepo, tree: GitOid) -> Result<Vec<(String, GitOid)>, GitError> {
    let mut out = Vec::new();
    walk_blobs(repo, tree, "", &mut out)?;
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

fn walk_blobs(
    repo: &GixVaultRepo,
    tree: GitOid,
    prefix: &str,
    out: &mut Vec<(String, GitOid)>,
) -> Result<(), GitError> {
    for entry in read_tree(repo, tree)? {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{prefix}/{}", entry.name)
        };
        match entry.mode {
            EntryMode::Tree => walk_blobs(repo, entry.oid, &path, out)?,
            EntryMode::Blob | EntryMode::BlobExecutable => out.push((path, entry.oid)),
        }
    }
    Ok(())
}

pub fn find_blob_at_path(
    repo: &GixVaultRepo,
    tree: GitOid,
    path: &str,
) -> Result<Option<GitOid>, GitError> {
    let mut current = tree;
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    let Some((last, dirs)) = components.split_last() else {
        return Ok(None);
    };
    for dir in dirs {
        let entries = read_tree(repo, current)?;
        match entries.iter().find(|e| e.name == *dir && e.mode == EntryMode::Tree) {
            Some(e) => current = e.oid,
            None => return Ok(None),
        }
    }
    let entries = read_tree(repo, current)?;
    Ok(entries
        .iter()
        .find(|e| e.name == *last && e.mode != EntryMode::Tree)
        .map(|e| e.oid))
}

/// Diff the recursive blob sets of two trees by comparing flattened
/// `path -> oid` maps. `old` of `None` is an empty tree.
pub fn diff_trees(
    repo: &GixVaultRepo,
    old: Option<GitOid>,
    new: GitOid,
) -> Result<Vec<DiffEntry>, GitError> {
    let old_map: BTreeMap<String, GitOid> = match old {
        Some(oid) => list_blobs(repo, oid)?.into_iter().collect(),
        None => BTreeMap::new(),
    };
    let new_map: BTreeMap<String, GitOid> = list_blobs(repo, new)?.into_iter().collect();

    let mut out = Vec::new();
    for (path, new_oid) in &new_map {
        match old_map.get(path) {
            None => out.push(DiffEntry {
                path: path.clone(),
                change: ChangeType::Added,
            }),
            Some(old_oid) if old_oid != new_oid => out.push(DiffEntry {
                path: path.clone(),
                change: ChangeType::Modified,
            }),
            Some(_) => {}
        }
    }
    for path in old_map.keys() {
        if !new_map.contains_key(path) {
            out.push(DiffEntry {
                path: path.clone(),
                change: ChangeType::Deleted,
            });
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}
