//! Rename Detector (§4.5): given a path missing on the server, finds its
//! successor via `file_id`, content hash, or path-history lookup.

use uuid::Uuid;

use crate::error::VaultError;
use crate::identity_store::IdentityStore;

/// How a rename was detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Resolved from the caller-supplied `file_id`.
    FileId,
    /// Resolved from a unique content-hash match.
    HashMatch,
    /// Resolved from the path-history log.
    PathHistory,
}

/// The result of a detection attempt (§6 `POST /detect-rename`).
#[derive(Debug, Clone)]
pub struct Detection {
    /// Whether a successor was found.
    pub found: bool,
    /// The file's current path, if found.
    pub new_path: Option<String>,
    /// The file's stable identity, if found.
    pub file_id: Option<Uuid>,
    /// How it was found.
    pub method: Option<DetectionMethod>,
}

impl Detection {
    fn not_found() -> Self {
        Self { found: false, new_path: None, file_id: None, method: None }
    }

    fn found(file_id: Uuid, new_path: String, method: DetectionMethod) -> Self {
        Self { found: true, new_path: Some(new_path), file_id: Some(file_id), method: Some(method) }
    }
}

/// Detect where `missing_path` went (§4.5 "Resolution order").
pub fn detect(
    identity: &IdentityStore,
    missing_path: &str,
    missing_hash: &str,
    file_id: Option<Uuid>,
) -> Result<Detection, VaultError> {
    // 1. file_id, if it still resolves but to a different path.
    if let Some(id) = file_id
        && let Some(record) = identity.get_by_id(id)?
        && record.current_path != missing_path
    {
        return Ok(Detection::found(record.file_id, record.current_path, DetectionMethod::FileId));
    }

    // 2. unique content-hash match at a different path; ambiguous if >1.
    let hash_matches: Vec<_> = identity
        .get_by_hash(missing_hash)?
        .into_iter()
        .filter(|r| r.current_path != missing_path)
        .collect();
    match hash_matches.len() {
        0 => {}
        1 => {
            let record = &hash_matches[0];
            return Ok(Detection::found(record.file_id, record.current_path.clone(), DetectionMethod::HashMatch));
        }
        _ => return Ok(Detection::not_found()),
    }

    // 3. path-history scan for any active record that once lived here.
    if let Some(record) = identity.find_by_any_path(missing_path)?
        && record.current_path != missing_path
    {
        return Ok(Detection::found(record.file_id, record.current_path, DetectionMethod::PathHistory));
    }

    Ok(Detection::not_found())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity_store::IdentityUpdate;

    #[test]
    fn resolves_by_file_id() {
        let store = IdentityStore::open_in_memory().unwrap();
        let id = store.ensure_file_id("old.md", Some("h1"), None).unwrap();
        store.update(id, IdentityUpdate { current_path: Some("new.md"), hash: None, commit: None }).unwrap();
        store.record_path_change(id, "old.md", "new.md").unwrap();

        let result = detect(&store, "old.md", "h1", Some(id)).unwrap();
        assert!(result.found);
        assert_eq!(result.new_path.as_deref(), Some("new.md"));
        assert_eq!(result.method, Some(DetectionMethod::FileId));
    }

    #[test]
    fn resolves_by_unique_hash_match() {
        let store = IdentityStore::open_in_memory().unwrap();
        let id = store.ensure_file_id("new.md", Some("h1"), None).unwrap();

        let result = detect(&store, "old.md", "h1", None).unwrap();
        assert!(result.found);
        assert_eq!(result.file_id, Some(id));
        assert_eq!(result.method, Some(DetectionMethod::HashMatch));
    }

    #[test]
    fn ambiguous_hash_match_reports_not_found() {
        let store = IdentityStore::open_in_memory().unwrap();
        store.ensure_file_id("a.md", Some("h1"), None).unwrap();
        store.ensure_file_id("b.md", Some("h1"), None).unwrap();

        let result = detect(&store, "old.md", "h1", None).unwrap();
        assert!(!result.found);
    }

    #[test]
    fn resolves_by_path_history_when_hash_unknown() {
        let store = IdentityStore::open_in_memory().unwrap();
        let id = store.ensure_file_id("old.md", None, None).unwrap();
        store.update(id, IdentityUpdate { current_path: Some("new.md"), hash: None, commit: None }).unwrap();
        store.record_path_change(id, "old.md", "new.md").unwrap();

        let result = detect(&store, "old.md", "does-not-match-anything", None).unwrap();
        assert!(result.found);
        assert_eq!(result.method, Some(DetectionMethod::PathHistory));
    }

    #[test]
    fn reports_not_found_when_nothing_matches() {
        let store = IdentityStore::open_in_memory().unwrap();
        let result = detect(&store, "gone.md", "unknown-hash", None).unwrap();
        assert!(!result.found);
    }
}
