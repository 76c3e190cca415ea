//! The `gix`-backed implementation of [`VaultRepo`].

use std::path::Path;

use crate::error::GitError;
use crate::repo::VaultRepo;
use crate::types::*;

pub(crate) const HEAD_REF: &str = "refs/heads/main";

/// A [`VaultRepo`] implementation backed by
/// [gix](https://github.com/GitoxideLabs/gitoxide), scoped to a single
/// vault's repository directory.
///
/// Construct via [`GixVaultRepo::open`] (discover-or-init at the given path)
/// — the Content Store's `init()` operation (§4.1) calls this once per vault
/// and caches the handle in the vault registry.
pub struct GixVaultRepo {
    pub(crate) repo: gix::Repository,
}

impl GixVaultRepo {
    /// Open the repository rooted at `path`, initializing a bare-worktree
    /// repository there if none exists yet.
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = match gix::open_opts(path, gix::open::Options::isolated()) {
            Ok(repo) => repo,
            Err(_) => gix::init(path).map_err(|e| GitError::BackendError {
                message: format!("failed to init repository at {}: {e}", path.display()),
            })?,
        };
        Ok(Self { repo })
    }
}

pub(crate) fn to_gix_oid(oid: GitOid) -> gix::ObjectId {
    gix::ObjectId::from_bytes_or_panic(oid.as_bytes())
}

pub(crate) fn from_gix_oid(oid: gix::ObjectId) -> GitOid {
    let bytes: [u8; 20] = oid.as_bytes().try_into().expect("sha1 is 20 bytes");
    GitOid::from_bytes(bytes)
}

pub(crate) fn from_gix_entry_mode(mode: gix::objs::tree::EntryMode) -> EntryMode {
    match mode.kind() {
        gix::objs::tree::EntryKind::BlobExecutable => EntryMode::BlobExecutable,
        gix::objs::tree::EntryKind::Tree => EntryMode::Tree,
        // Links and commits (submodules) are stored as-is but the vault
        // sync contract only ever writes plain or executable blobs.
        _ => EntryMode::Blob,
    }
}

pub(crate) fn to_gix_entry_kind(mode: EntryMode) -> gix::objs::tree::EntryKind {
    match mode {
        EntryMode::Blob => gix::objs::tree::EntryKind::Blob,
        EntryMode::BlobExecutable => gix::objs::tree::EntryKind::BlobExecutable,
        EntryMode::Tree => gix::objs::tree::EntryKind::Tree,
    }
}

impl VaultRepo for GixVaultRepo {
    fn head(&self) -> Result<Option<GitOid>, GitError> {
        crate::refs_impl::head(self)
    }

    fn read_tree(&self, oid: GitOid) -> Result<Vec<TreeEntry>, GitError> {
        crate::objects_impl::read_tree(self, oid)
    }

    fn read_commit(&self, oid: GitOid) -> Result<CommitInfo, GitError> {
        crate::objects_impl::read_commit(self, oid)
    }

    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError> {
        crate::objects_impl::read_blob(self, oid)
    }

    fn write_blob(&self, data: &[u8]) -> Result<GitOid, GitError> {
        crate::objects_impl::write_blob(self, data)
    }

    fn edit_tree(&self, base: Option<GitOid>, edits: &[TreeEdit]) -> Result<GitOid, GitError> {
        crate::objects_impl::edit_tree(self, base, edits)
    }

    fn create_commit(
        &self,
        tree: GitOid,
        parents: &[GitOid],
        message: &str,
    ) -> Result<GitOid, GitError> {
        crate::objects_impl::create_commit(self, tree, parents, message)
    }

    fn list_blobs(&self, tree: GitOid) -> Result<Vec<(String, GitOid)>, GitError> {
        crate::objects_impl::list_blobs(self, tree)
    }

    fn find_blob_at_path(&self, tree: GitOid, path: &str) -> Result<Option<GitOid>, GitError> {
        crate::objects_impl::find_blob_at_path(self, tree, path)
    }

    fn diff_trees(&self, old: Option<GitOid>, new: GitOid) -> Result<Vec<DiffEntry>, GitError> {
        crate::objects_impl::diff_trees(self, old, new)
    }
}
