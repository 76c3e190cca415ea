//! Per-vault structure CRDT (§4.8): a replicated map of
//! `file_id -> {path, type, deleted, timestamps, hash?}` with tombstone
//! deletion, driving file-tree agreement between devices without a central
//! coordinator.
//!
//! Implemented as a last-writer-wins map keyed by `file_id` (§9 design note:
//! "Any replicated map with last-writer-wins on `{path, hash, timestamps}`
//! plus tombstone delete satisfies the structure CRDT contract"). Merge is a
//! per-key `max-by(updated_at, then entry bytes)`, which is commutative,
//! associative, and idempotent regardless of delivery order (§4.8).

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VaultError;

/// One entry of the structure CRDT map.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StructureEntry {
    /// The file's path, or its last path before deletion.
    pub path: String,
    /// A freeform type tag (`"file"`, `"folder"`, ...); opaque to the server.
    pub entry_type: String,
    /// Tombstone marker — `true` once the file has been deleted.
    pub deleted: bool,
    /// Seconds since epoch of this entry's last write; the LWW tiebreak key.
    pub updated_at: i64,
    /// Content hash, if applicable.
    pub hash: Option<String>,
}

/// One `(file_id, entry)` update as carried in a `structure-update` wire
/// frame's `payload` (§4.7).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StructureUpdate {
    /// The entry's stable file identity.
    pub file_id: Uuid,
    /// The entry to merge in.
    pub entry: StructureEntry,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<Uuid, StructureEntry>,
}

/// The single per-vault structure CRDT instance.
#[derive(Default)]
pub struct StructureCrdtStore {
    inner: Mutex<Inner>,
}

impl StructureCrdtStore {
    /// Merge a decoded update into the map. Last-writer-wins by
    /// `updated_at`; ties broken by comparing the serialized entry bytes so
    /// the merge is deterministic regardless of arrival order.
    pub fn apply_update(&self, update: &StructureUpdate) {
        let mut inner = self.inner.lock().expect("structure CRDT mutex poisoned");
        match inner.entries.get(&update.file_id) {
            Some(existing) if !should_replace(existing, &update.entry) => {}
            _ => {
                inner.entries.insert(update.file_id, update.entry.clone());
            }
        }
    }

    /// Decode a wire `payload` (JSON) and apply it.
    pub fn apply_update_bytes(&self, payload: &[u8]) -> Result<(), VaultError> {
        let update: StructureUpdate = serde_json::from_slice(payload)
            .map_err(|e| VaultError::validation(format!("malformed structure update: {e}")))?;
        self.apply_update(&update);
        Ok(())
    }

    /// The current materialized map, excluding tombstoned entries.
    #[must_use]
    pub fn materialize(&self) -> HashMap<Uuid, StructureEntry> {
        self.inner
            .lock()
            .expect("structure CRDT mutex poisoned")
            .entries
            .iter()
            .filter(|(_, e)| !e.deleted)
            .map(|(id, e)| (*id, e.clone()))
            .collect()
    }

    /// Serialize the full map (including tombstones) for persistence or for
    /// sending a full snapshot to a joining client (§4.8 "persisted as
    /// opaque bytes").
    pub fn encode_state_as_update(&self) -> Result<Vec<u8>, VaultError> {
        let inner = self.inner.lock().expect("structure CRDT mutex poisoned");
        serde_json::to_vec(&inner.entries).map_err(|e| VaultError::fatal(format!("failed to encode structure CRDT: {e}")))
    }

    /// Load a previously persisted snapshot, merging each entry via the same
    /// LWW rule as [`apply_update`](Self::apply_update).
    pub fn load_state(&self, bytes: &[u8]) -> Result<(), VaultError> {
        let entries: HashMap<Uuid, StructureEntry> = serde_json::from_slice(bytes)
            .map_err(|e| VaultError::fatal(format!("failed to decode structure CRDT snapshot: {e}")))?;
        for (file_id, entry) in entries {
            self.apply_update(&StructureUpdate { file_id, entry });
        }
        Ok(())
    }
}

fn should_replace(existing: &StructureEntry, incoming: &StructureEntry) -> bool {
    match incoming.updated_at.cmp(&existing.updated_at) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => tiebreak_bytes(incoming) > tiebreak_bytes(existing),
    }
}

fn tiebreak_bytes(entry: &StructureEntry) -> Vec<u8> {
    serde_json::to_vec(entry).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, updated_at: i64, deleted: bool) -> StructureEntry {
        StructureEntry { path: path.to_owned(), entry_type: "file".to_owned(), deleted, updated_at, hash: None }
    }

    #[test]
    fn later_update_wins() {
        let store = StructureCrdtStore::default();
        let id = Uuid::new_v4();
        store.apply_update(&StructureUpdate { file_id: id, entry: entry("a.md", 1, false) });
        store.apply_update(&StructureUpdate { file_id: id, entry: entry("b.md", 2, false) });
        assert_eq!(store.materialize()[&id].path, "b.md");
    }

    #[test]
    fn out_of_order_delivery_converges() {
        let a = StructureCrdtStore::default();
        let b = StructureCrdtStore::default();
        let id = Uuid::new_v4();
        let u1 = StructureUpdate { file_id: id, entry: entry("a.md", 1, false) };
        let u2 = StructureUpdate { file_id: id, entry: entry("b.md", 2, false) };

        a.apply_update(&u1);
        a.apply_update(&u2);
        b.apply_update(&u2);
        b.apply_update(&u1);

        assert_eq!(a.materialize()[&id], b.materialize()[&id]);
    }

    #[test]
    fn tombstone_hides_from_materialize() {
        let store = StructureCrdtStore::default();
        let id = Uuid::new_v4();
        store.apply_update(&StructureUpdate { file_id: id, entry: entry("a.md", 1, false) });
        store.apply_update(&StructureUpdate { file_id: id, entry: entry("a.md", 2, true) });
        assert!(!store.materialize().contains_key(&id));
    }

    #[test]
    fn apply_is_idempotent() {
        let store = StructureCrdtStore::default();
        let id = Uuid::new_v4();
        let update = StructureUpdate { file_id: id, entry: entry("a.md", 1, false) };
        store.apply_update(&update);
        store.apply_update(&update);
        assert_eq!(store.materialize().len(), 1);
    }
}
