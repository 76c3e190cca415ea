//! Git abstraction layer for the vault sync server.
//!
//! This crate defines [`VaultRepo`] — the single interface through which the
//! Content Store touches an on-disk repository. No other crate in this
//! workspace imports `gix` directly; they program against the trait.
//!
//! # Crate layout
//!
//! - [`repo`] — the [`VaultRepo`] trait definition.
//! - [`types`] — value types used in trait signatures ([`GitOid`],
//!   [`TreeEntry`], [`CommitInfo`], [`TreeEdit`], [`DiffEntry`]).
//! - [`error`] — the [`GitError`] enum returned by all trait methods.
//! - [`gix_repo`] — the `gix`-backed implementation.

pub mod error;
pub mod gix_repo;
mod objects_impl;
mod refs_impl;
pub mod repo;
pub mod types;

pub use error::GitError;
pub use gix_repo::GixVaultRepo;
pub use repo::VaultRepo;
pub use types::{ChangeType, CommitInfo, DiffEntry, EntryMode, GitOid, OidParseError, TreeEdit, TreeEntry};
