//! The [`VaultRepo`] trait — the single abstraction boundary between the
//! Content Store and git.
//!
//! The Content Store (in the `vault-sync` crate) never imports `gix`; it
//! programs against this trait instead. The trait is object-safe so callers
//! can use `dyn VaultRepo` or `Box<dyn VaultRepo>` — one boxed repo per open
//! vault, held by the vault registry (§9 "global CRDT stores and DB handle
//! caches" redesign note applies equally to repo handles).
//!
//! One `VaultRepo` instance is opened per vault and speaks only for that
//! vault's `main` branch, which is the vault's linear history (§3: "no
//! branches"). There is no ref namespace to parameterize over — every method
//! that needs "the current head" reads/writes a single fixed ref internally.

use crate::error::GitError;
use crate::types::{CommitInfo, DiffEntry, GitOid, TreeEdit, TreeEntry};

/// The git abstraction trait used by the Content Store.
///
/// Implementations may be backed by `gix` (the only backend shipped here) or
/// a test double. Every mutating method is total: it either succeeds and
/// returns a new value, or returns `Err` and leaves on-disk state unchanged
/// (§4.1 failure semantics).
pub trait VaultRepo: Send + Sync {
    /// Resolve the vault's `main` branch to its current commit, or `None` if
    /// the vault has no commits yet.
    fn head(&self) -> Result<Option<GitOid>, GitError>;

    /// Read the entries of a tree object (one level, not recursive).
    fn read_tree(&self, oid: GitOid) -> Result<Vec<TreeEntry>, GitError>;

    /// Read a commit object's metadata.
    fn read_commit(&self, oid: GitOid) -> Result<CommitInfo, GitError>;

    /// Read the contents of a blob object.
    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError>;

    /// Write a blob to the object store and return its OID.
    fn write_blob(&self, data: &[u8]) -> Result<GitOid, GitError>;

    /// Apply a batch of edits against a base tree (recursing into nested
    /// paths, creating or pruning subtrees as needed) and return the OID of
    /// the resulting tree. `base` may be `None` for an empty tree.
    fn edit_tree(&self, base: Option<GitOid>, edits: &[TreeEdit]) -> Result<GitOid, GitError>;

    /// Create a commit object with the given tree and parents and move
    /// `main` to it. Returns the new commit OID.
    fn create_commit(
        &self,
        tree: GitOid,
        parents: &[GitOid],
        message: &str,
    ) -> Result<GitOid, GitError>;

    /// List the recursive flat set of blob paths present at `tree`, in
    /// `path -> oid` form, depth-first, slash-joined.
    fn list_blobs(&self, tree: GitOid) -> Result<Vec<(String, GitOid)>, GitError>;

    /// Find a single blob's OID at `path` within `tree`, or `None` if absent.
    fn find_blob_at_path(&self, tree: GitOid, path: &str) -> Result<Option<GitOid>, GitError>;

    /// Diff the recursive blob sets of two trees. `old` of `None` is treated
    /// as an empty tree (every path in `new` reports as `Added`).
    fn diff_trees(&self, old: Option<GitOid>, new: GitOid) -> Result<Vec<DiffEntry>, GitError>;
}
