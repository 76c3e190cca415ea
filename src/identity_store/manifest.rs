//! The disaster-recovery manifest (§3 "Git-side manifest file").
//!
//! `.scion/manifest.json` is committed into the vault's own history so the
//! Identity Store can be rebuilt from history alone if its sqlite database
//! is lost. It maps `file_id -> {path, created_at}` for every non-deleted
//! identity record as of the commit it was written in (§3 invariant 6).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::IdentityStore;
use crate::error::VaultError;

const MANIFEST_VERSION: u32 = 1;

/// One entry of the disaster-recovery manifest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    /// The file's path at the commit this manifest was written in.
    pub path: String,
    /// Seconds since epoch the identity record was created.
    pub created_at: i64,
}

/// The disaster-recovery manifest document.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    /// Schema version, bumped on incompatible format changes.
    pub version: u32,
    /// Seconds since epoch this document was produced.
    pub updated_at: i64,
    /// `file_id -> entry`, keyed by canonical lowercase UUID string for
    /// stable JSON ordering (`BTreeMap`, serialized sorted).
    pub files: BTreeMap<String, ManifestEntry>,
}

/// Build the manifest document from every active record in `store`.
pub fn build(store: &IdentityStore) -> Result<Manifest, VaultError> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    let mut files = BTreeMap::new();
    for record in store.all_active()? {
        files.insert(
            record.file_id.to_string(),
            ManifestEntry { path: record.current_path, created_at: record.created_at },
        );
    }
    Ok(Manifest { version: MANIFEST_VERSION, updated_at: now, files })
}

/// Serialize `manifest` to the bytes committed at `.scion/manifest.json`.
pub fn to_bytes(manifest: &Manifest) -> Result<Vec<u8>, VaultError> {
    serde_json::to_vec_pretty(manifest).map_err(|e| VaultError::fatal(format!("failed to serialize manifest: {e}")))
}

/// Parse manifest bytes read back from the vault's history.
pub fn from_bytes(bytes: &[u8]) -> Result<Manifest, VaultError> {
    serde_json::from_slice(bytes).map_err(|e| VaultError::fatal(format!("failed to parse manifest: {e}")))
}

/// Rebuild the Identity Store from a recovered manifest. Used when the
/// sqlite database is missing or corrupt but the vault history survives.
/// Records not already present are created with the manifest's path and
/// timestamps; existing active records are left untouched.
pub fn rebuild_from_manifest(store: &IdentityStore, manifest: &Manifest) -> Result<(), VaultError> {
    for (file_id, entry) in &manifest.files {
        let Ok(uuid) = Uuid::parse_str(file_id) else { continue };
        if store.get_by_id(uuid)?.is_some() {
            continue;
        }
        store.insert_recovered(uuid, &entry.path, entry.created_at)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let store = IdentityStore::open_in_memory().unwrap();
        store.ensure_file_id("a.md", None, None).unwrap();
        let manifest = build(&store).unwrap();
        let bytes = to_bytes(&manifest).unwrap();
        let parsed = from_bytes(&bytes).unwrap();
        assert_eq!(manifest, parsed);
        assert_eq!(parsed.files.len(), 1);
    }

    #[test]
    fn rebuild_skips_records_already_present() {
        let store = IdentityStore::open_in_memory().unwrap();
        let id = store.ensure_file_id("a.md", None, None).unwrap();
        let manifest = build(&store).unwrap();

        // Simulate a fresh store recovering from the manifest alone.
        let fresh = IdentityStore::open_in_memory().unwrap();
        rebuild_from_manifest(&fresh, &manifest).unwrap();
        let recovered = fresh.get_by_id(id).unwrap().unwrap();
        assert_eq!(recovered.current_path, "a.md");
    }
}
