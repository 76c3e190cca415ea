//! `gix`-backed head resolution.

use crate::error::GitError;
use crate::gix_repo::{GixVaultRepo, HEAD_REF, from_gix_oid};
use crate::types::GitOid;

pub fn head(repo: &GixVaultRepo) -> Result<Option<GitOid>, GitError> {
    let reference = match repo.repo.try_find_reference(HEAD_REF) {
        Ok(Some(r)) => r,
        Ok(None) => return Ok(None),
        Err(e) => {
            return Err(GitError::BackendError {
                message: format!("failed to read HEAD ref: {e}"),
            });
        }
    };
    let id = reference
        .try_id()
        .ok_or_else(|| GitError::BackendError {
            message: "HEAD ref is symbolic, expected a direct reference".to_owned(),
        })?
        .detach();
    Ok(Some(from_gix_oid(id)))
}
