//! Error types for git operations.
//!
//! [`GitError`] is the single error type returned by all [`VaultRepo`](crate::VaultRepo)
//! trait methods. It uses rich enum variants so callers can match on specific
//! failure modes without parsing error messages.

use thiserror::Error;

/// Errors returned by [`VaultRepo`](crate::VaultRepo) operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// A requested object or ref was not found.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable description of what was missing.
        message: String,
    },

    /// An OID string could not be parsed or was otherwise invalid.
    #[error("invalid OID `{value}`: {reason}")]
    InvalidOid {
        /// The raw value that failed validation.
        value: String,
        /// Why validation failed.
        reason: String,
    },

    /// An I/O error occurred opening or initializing the repository.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The underlying backend (gix) returned an unclassified error.
    ///
    /// The `message` should include enough context to diagnose the failure.
    #[error("git backend error: {message}")]
    BackendError {
        /// Freeform error description from the backend.
        message: String,
    },
}
