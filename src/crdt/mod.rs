//! Replicated data types for the Real-time Fan-out (§4.8).
//!
//! [`text`] holds the per-file collaborative text CRDT; [`structure`] holds
//! the single per-vault file-tree CRDT. Both are owned by the vault
//! registry's [`VaultHandle`](crate::registry::VaultHandle) and mutated only
//! under that vault's writer lock (§5).

pub mod structure;
pub mod text;
