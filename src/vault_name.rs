//! Vault name validation (§3).
//!
//! A vault name must match `^[A-Za-z0-9_\- ]{1,100}$` and must not be used to
//! escape the vault root. Invariant 7 (§3): a name that fails validation
//! never produces or mutates any state — call this before touching the
//! registry, not after.

use crate::error::VaultError;

/// Validate `name` against the vault name grammar (§3).
///
/// Returns `Ok(())` if `name` is safe to use as a single path component
/// under `VAULT_PATH`.
pub fn validate(name: &str) -> Result<(), VaultError> {
    if name.is_empty() || name.len() > 100 {
        return Err(VaultError::validation(format!(
            "vault name must be 1-100 characters, got {}",
            name.len()
        )));
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(VaultError::validation(
            "vault name must not contain '..', '/', or '\\'".to_owned(),
        ));
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ' ');
    if !valid {
        return Err(VaultError::validation(format!(
            "vault name `{name}` contains characters outside [A-Za-z0-9_- ]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate;

    #[test]
    fn accepts_plain_names() {
        assert!(validate("my vault_1-2").is_ok());
    }

    #[test]
    fn rejects_path_traversal() {
        assert!(validate("../etc").is_err());
        assert!(validate("a/b").is_err());
        assert!(validate("a\\b").is_err());
    }

    #[test]
    fn rejects_empty_and_overlong() {
        assert!(validate("").is_err());
        assert!(validate(&"a".repeat(101)).is_err());
    }

    #[test]
    fn rejects_unusual_characters() {
        assert!(validate("vault$name").is_err());
        assert!(validate("vault;rm -rf").is_err());
    }
}
