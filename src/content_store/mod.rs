//! Content Store (§4.1): content-addressed, history-preserving storage of a
//! single vault's files, built on [`vault_git::VaultRepo`].
//!
//! All write operations are total (§4.1 failure semantics): they either
//! succeed and return a new head, or return `Err` and leave on-disk state
//! untouched — `VaultRepo`'s own methods are total for the same reason, so
//! this layer only needs to avoid partial multi-call sequences (it commits
//! everything for one logical operation through a single `edit_tree` +
//! `create_commit` pair).

pub mod merge;

use sha2::{Digest, Sha256};
use vault_git::{EntryMode, GitOid, TreeEdit, VaultRepo};

use crate::error::VaultError;

/// The reserved metadata directory (§3 invariant 8) — never returned from
/// [`ContentStore::list_tracked`] or [`ContentStore::changed_since`], never
/// accepted as a user path.
pub const RESERVED_PREFIX: &str = ".scion/";
/// The disaster-recovery manifest path (§3 "Git-side manifest file").
pub const MANIFEST_PATH: &str = ".scion/manifest.json";

/// Returns `true` if `path` is a reserved metadata path that user operations
/// must never see or accept.
#[must_use]
pub fn is_reserved(path: &str) -> bool {
    path.starts_with(RESERVED_PREFIX) || path == ".gitignore"
}

/// SHA-256 of `bytes`, lowercase hex — the vault's content hash (§3).
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// A single edit to apply as part of one commit.
pub enum Edit {
    /// Write `bytes` at `path`, hashing and storing a fresh blob.
    Write { path: String, bytes: Vec<u8> },
    /// Point `path` at an already-stored blob (used by `mv` to preserve
    /// content-addressed identity without rehashing).
    Reuse { path: String, oid: GitOid },
    /// Remove `path`. No-op if absent.
    Remove { path: String },
}

/// Content-addressed, history-preserving store for one vault.
pub struct ContentStore {
    repo: Box<dyn VaultRepo>,
}

impl ContentStore {
    /// Wrap an already-open repo handle.
    #[must_use]
    pub fn new(repo: Box<dyn VaultRepo>) -> Self {
        Self { repo }
    }

    /// Idempotent vault init (§4.1): ensures the vault has an initial commit
    /// containing a `.gitignore` that excludes the reserved metadata
    /// directory. No-op if the vault already has a head.
    pub fn init(&self) -> Result<GitOid, VaultError> {
        if let Some(head) = self.repo.head()? {
            return Ok(head);
        }
        let gitignore = b".scion/\n";
        let blob = self.repo.write_blob(gitignore)?;
        let tree = self.repo.edit_tree(
            None,
            &[TreeEdit::Upsert {
                path: ".gitignore".to_owned(),
                mode: EntryMode::Blob,
                oid: blob,
            }],
        )?;
        Ok(self.repo.create_commit(tree, &[], "init vault")?)
    }

    /// The vault's current head commit, or `None` if the vault is empty.
    pub fn head(&self) -> Result<Option<GitOid>, VaultError> {
        Ok(self.repo.head()?)
    }

    fn head_tree(&self) -> Result<Option<GitOid>, VaultError> {
        match self.repo.head()? {
            None => Ok(None),
            Some(head) => Ok(Some(self.repo.read_commit(head)?.tree_oid)),
        }
    }

    /// Write `bytes` at `path` and commit. If `path` already holds
    /// byte-identical content, returns the current head unchanged and
    /// creates no new commit (§4.1 `put`).
    pub fn put(&self, path: &str, bytes: &[u8], message: &str) -> Result<GitOid, VaultError> {
        if let Some(existing) = self.read_current(path)?
            && existing == bytes
        {
            return Ok(self.repo.head()?.expect("a tracked path implies a head"));
        }
        self.commit_edits(vec![Edit::Write { path: path.to_owned(), bytes: bytes.to_vec() }], message)
    }

    /// Remove `path` and commit. Returns `None` (no commit made) if `path`
    /// was not present (§4.1 `delete`).
    pub fn delete(&self, path: &str, message: &str) -> Result<Option<GitOid>, VaultError> {
        if self.read_current(path)?.is_none() {
            return Ok(None);
        }
        Ok(Some(self.commit_edits(vec![Edit::Remove { path: path.to_owned() }], message)?))
    }

    /// Atomic rename, preserving the blob's content-addressed identity
    /// (§4.1 `move`). Optionally writes `new_bytes` at the destination in
    /// the same commit (used when the rename also carries a content update).
    pub fn mv(
        &self,
        old_path: &str,
        new_path: &str,
        new_bytes: Option<&[u8]>,
        message: &str,
    ) -> Result<GitOid, VaultError> {
        let mut edits = vec![Edit::Remove { path: old_path.to_owned() }];
        match new_bytes {
            Some(bytes) => edits.push(Edit::Write { path: new_path.to_owned(), bytes: bytes.to_vec() }),
            None => {
                let oid = self.blob_oid_at_head(old_path)?.ok_or_else(|| {
                    VaultError::not_found("file", old_path.to_owned())
                })?;
                edits.push(Edit::Reuse { path: new_path.to_owned(), oid });
            }
        }
        self.commit_edits(edits, message)
    }

    /// Apply an arbitrary batch of edits as a single commit. Used directly
    /// by the Operation Engine's rename handling to amend the
    /// disaster-recovery manifest into the same commit as the rename.
    pub fn commit_edits(&self, edits: Vec<Edit>, message: &str) -> Result<GitOid, VaultError> {
        let base_tree = self.head_tree()?;
        let mut tree_edits = Vec::with_capacity(edits.len());
        for edit in edits {
            match edit {
                Edit::Write { path, bytes } => {
                    let oid = self.repo.write_blob(&bytes)?;
                    tree_edits.push(TreeEdit::Upsert { path, mode: EntryMode::Blob, oid });
                }
                Edit::Reuse { path, oid } => {
                    tree_edits.push(TreeEdit::Upsert { path, mode: EntryMode::Blob, oid });
                }
                Edit::Remove { path } => tree_edits.push(TreeEdit::Remove { path }),
            }
        }
        let new_tree = self.repo.edit_tree(base_tree, &tree_edits)?;
        let parents: Vec<GitOid> = self.repo.head()?.into_iter().collect();
        Ok(self.repo.create_commit(new_tree, &parents, message)?)
    }

    fn blob_oid_at_head(&self, path: &str) -> Result<Option<GitOid>, VaultError> {
        match self.head_tree()? {
            None => Ok(None),
            Some(tree) => Ok(self.repo.find_blob_at_path(tree, path)?),
        }
    }

    /// The OID of the blob currently at `path`, or `None` if untracked.
    /// Used by the Operation Engine to preserve content-addressed identity
    /// when a rename carries no new bytes (§4.1 `move`).
    pub fn current_blob_oid(&self, path: &str) -> Result<Option<GitOid>, VaultError> {
        self.blob_oid_at_head(path)
    }

    /// Current bytes at `path`, or `None` if untracked.
    pub fn read_current(&self, path: &str) -> Result<Option<Vec<u8>>, VaultError> {
        match self.blob_oid_at_head(path)? {
            None => Ok(None),
            Some(oid) => Ok(Some(self.repo.read_blob(oid)?)),
        }
    }

    /// Bytes of `path` as of `commit`, or `None` if the file did not exist
    /// at that commit (§4.1 `read_at`).
    pub fn read_at(&self, commit: GitOid, path: &str) -> Result<Option<Vec<u8>>, VaultError> {
        let tree = self.repo.read_commit(commit)?.tree_oid;
        match self.repo.find_blob_at_path(tree, path)? {
            None => Ok(None),
            Some(oid) => Ok(Some(self.repo.read_blob(oid)?)),
        }
    }

    /// Bytes of a logical file as of `commit`, trying `current_path` first
    /// and then each entry of `previous_paths` in reverse chronological
    /// order (§4.1 `read_at_with_history`). `previous_paths` is supplied by
    /// the caller (the Identity Store owns path history, not this store).
    pub fn read_at_with_history(
        &self,
        commit: GitOid,
        current_path: &str,
        previous_paths: &[String],
    ) -> Result<Option<Vec<u8>>, VaultError> {
        if let Some(bytes) = self.read_at(commit, current_path)? {
            return Ok(Some(bytes));
        }
        for path in previous_paths.iter().rev() {
            if let Some(bytes) = self.read_at(commit, path)? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }

    /// All tracked paths at the current head, excluding reserved paths
    /// (§4.1 `list_tracked`).
    pub fn list_tracked(&self) -> Result<Vec<String>, VaultError> {
        match self.head_tree()? {
            None => Ok(Vec::new()),
            Some(tree) => Ok(self
                .repo
                .list_blobs(tree)?
                .into_iter()
                .map(|(path, _)| path)
                .filter(|p| !is_reserved(p))
                .collect()),
        }
    }

    /// Returns `(head, changed_paths)` relative to `since` (§4.1
    /// `changed_since`). Empty list if `since == head`; every tracked path
    /// if `since` is `None` or not a commit in this vault.
    pub fn changed_since(&self, since: Option<GitOid>) -> Result<(Option<GitOid>, Vec<String>), VaultError> {
        let head = self.repo.head()?;
        let Some(head) = head else {
            return Ok((None, Vec::new()));
        };
        if since == Some(head) {
            return Ok((Some(head), Vec::new()));
        }
        let since_tree = match since {
            None => None,
            Some(oid) => match self.repo.read_commit(oid) {
                Ok(info) => Some(info.tree_oid),
                Err(_) => return Ok((Some(head), self.list_tracked()?)),
            },
        };
        let head_tree = self.repo.read_commit(head)?.tree_oid;
        let changed = self
            .repo
            .diff_trees(since_tree, head_tree)?
            .into_iter()
            .map(|e| e.path)
            .filter(|p| !is_reserved(p))
            .collect();
        Ok((Some(head), changed))
    }
}
