//! Server configuration, parsed from environment variables and CLI flags.
//!
//! Recognized settings (§6): `PORT`, `HOST`, `LOG_LEVEL`, `VAULT_PATH`. Every
//! field is also overridable as a `--flag`, following the teacher's
//! `#[derive(Parser)]` + doc-comment-as-`--help` idiom.

use std::path::PathBuf;

use clap::Parser;

/// `vaultd` server configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "vaultd")]
#[command(version, about = "Self-hosted multi-vault file synchronization server")]
pub struct Config {
    /// TCP port to listen on.
    #[arg(long, env = "PORT", default_value_t = 7420)]
    pub port: u16,

    /// Address to bind the HTTP/WS listener to.
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Tracing filter threshold (e.g. `info`, `debug`, `vault_sync=debug`).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Root directory under which every vault's repository and identity
    /// store is created. Created on startup if missing; relative paths are
    /// resolved against the current working directory.
    #[arg(long, env = "VAULT_PATH", default_value = "./vaults")]
    pub vault_path: PathBuf,
}

impl Config {
    /// Parse from `std::env::args()` and the process environment.
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }

    /// Resolve [`Self::vault_path`] to an absolute path, creating it if
    /// necessary. Failure here is a fatal startup error (§6): the server
    /// cannot serve any vault without a writable root.
    pub fn resolve_vault_path(&self) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.vault_path)?;
        Ok(self.vault_path.canonicalize()?)
    }
}
