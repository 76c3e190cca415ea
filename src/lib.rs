//! `vault-sync` library crate — the self-hosted multi-vault file
//! synchronization server's domain modules, re-exported for the `vaultd`
//! binary and integration tests.
//!
//! The primary interface is the `vaultd` binary (`src/main.rs`), which
//! wires [`config::Config`], [`registry::VaultRegistry`], and
//! [`http::router`] together behind a Tokio runtime.

pub mod batch;
pub mod config;
pub mod content_store;
pub mod crdt;
pub mod engine;
pub mod error;
pub mod http;
pub mod identity_store;
pub mod realtime;
pub mod registry;
pub mod rename_detector;
pub mod telemetry;
pub mod time;
pub mod vault_name;
