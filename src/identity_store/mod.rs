//! Identity Store (§4.2): the per-vault, persistent mapping from a stable
//! `file_id` to its current path, content hash, last commit, soft-delete
//! marker, and rename history.
//!
//! Backed by `rusqlite` in WAL mode, one database file per vault
//! (`.scion/metadata.db`, §6) — not tracked in the vault's own history,
//! mirroring the disaster-recovery manifest's complementary role (§3
//! "Git-side manifest file").

pub mod manifest;

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::error::VaultError;

/// A row of the Identity Store (§3 "Identity record").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityRecord {
    /// Stable identifier, assigned once and never reused (§3 invariant 1).
    pub file_id: Uuid,
    /// The path this file currently lives at, or last lived at if deleted.
    pub current_path: String,
    /// SHA-256 of the current bytes, if known.
    pub content_hash: Option<String>,
    /// The last commit that changed this file, if known.
    pub last_commit: Option<String>,
    /// Seconds since epoch when this record was created.
    pub created_at: i64,
    /// Seconds since epoch of the last mutation.
    pub updated_at: i64,
    /// Seconds since epoch of the soft-delete, if deleted.
    pub deleted_at: Option<i64>,
}

/// Fields an [`IdentityStore::update`] call may change.
#[derive(Default)]
pub struct IdentityUpdate<'a> {
    /// New current path, if the file was renamed.
    pub current_path: Option<&'a str>,
    /// New content hash, if the file's bytes changed.
    pub hash: Option<&'a str>,
    /// New last-commit identifier.
    pub commit: Option<&'a str>,
}

fn now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// Persistent per-vault identity mapping.
pub struct IdentityStore {
    conn: Mutex<Connection>,
}

impl IdentityStore {
    /// Open (creating if absent) the identity database at `db_path`.
    pub fn open(db_path: &std::path::Path) -> Result<Self, VaultError> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS identities (
                file_id      TEXT PRIMARY KEY,
                current_path TEXT NOT NULL,
                content_hash TEXT,
                last_commit  TEXT,
                created_at   INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL,
                deleted_at   INTEGER
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_identities_active_path
                ON identities(current_path)
                WHERE deleted_at IS NULL;

            CREATE INDEX IF NOT EXISTS idx_identities_hash ON identities(content_hash);

            CREATE TABLE IF NOT EXISTS path_history (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id    TEXT NOT NULL,
                old_path   TEXT NOT NULL,
                new_path   TEXT NOT NULL,
                changed_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_path_history_file_id ON path_history(file_id);
            ",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory store, for tests.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, VaultError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "
            CREATE TABLE identities (
                file_id      TEXT PRIMARY KEY,
                current_path TEXT NOT NULL,
                content_hash TEXT,
                last_commit  TEXT,
                created_at   INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL,
                deleted_at   INTEGER
            );
            CREATE UNIQUE INDEX idx_identities_active_path
                ON identities(current_path) WHERE deleted_at IS NULL;
            CREATE INDEX idx_identities_hash ON identities(content_hash);
            CREATE TABLE path_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id TEXT NOT NULL,
                old_path TEXT NOT NULL,
                new_path TEXT NOT NULL,
                changed_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<IdentityRecord> {
        let file_id: String = row.get("file_id")?;
        Ok(IdentityRecord {
            file_id: Uuid::parse_str(&file_id).unwrap_or_else(|_| Uuid::nil()),
            current_path: row.get("current_path")?,
            content_hash: row.get("content_hash")?,
            last_commit: row.get("last_commit")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            deleted_at: row.get("deleted_at")?,
        })
    }

    /// Return the active record at `path`, or create a fresh one if none
    /// exists. Updates `hash`/`commit` on an existing record when provided
    /// (§4.2 `ensure_file_id`).
    pub fn ensure_file_id(
        &self,
        path: &str,
        hash: Option<&str>,
        commit: Option<&str>,
    ) -> Result<Uuid, VaultError> {
        if let Some(existing) = self.get_by_path(path)? {
            if hash.is_some() || commit.is_some() {
                self.update(
                    existing.file_id,
                    IdentityUpdate { current_path: None, hash, commit },
                )?;
            }
            return Ok(existing.file_id);
        }
        let file_id = Uuid::new_v4();
        let ts = now();
        let conn = self.conn.lock().expect("identity store mutex poisoned");
        conn.execute(
            "INSERT INTO identities (file_id, current_path, content_hash, last_commit, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, NULL)",
            params![file_id.to_string(), path, hash, commit, ts],
        )?;
        Ok(file_id)
    }

    /// Look up by `file_id`, excluding soft-deleted rows.
    pub fn get_by_id(&self, file_id: Uuid) -> Result<Option<IdentityRecord>, VaultError> {
        let conn = self.conn.lock().expect("identity store mutex poisoned");
        Ok(conn
            .query_row(
                "SELECT * FROM identities WHERE file_id = ?1 AND deleted_at IS NULL",
                params![file_id.to_string()],
                Self::row_to_record,
            )
            .optional()?)
    }

    /// Look up the active record currently at `path`.
    pub fn get_by_path(&self, path: &str) -> Result<Option<IdentityRecord>, VaultError> {
        let conn = self.conn.lock().expect("identity store mutex poisoned");
        Ok(conn
            .query_row(
                "SELECT * FROM identities WHERE current_path = ?1 AND deleted_at IS NULL",
                params![path],
                Self::row_to_record,
            )
            .optional()?)
    }

    /// All active records whose content hash equals `hash`.
    pub fn get_by_hash(&self, hash: &str) -> Result<Vec<IdentityRecord>, VaultError> {
        let conn = self.conn.lock().expect("identity store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT * FROM identities WHERE content_hash = ?1 AND deleted_at IS NULL",
        )?;
        let rows = stmt.query_map(params![hash], Self::row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Apply `update` to `file_id`, bumping `updated_at`.
    ///
    /// Callers that change `current_path` MUST also call
    /// [`record_path_change`](Self::record_path_change) in the same
    /// writer-held critical section (§3 invariant 5).
    pub fn update(&self, file_id: Uuid, update: IdentityUpdate<'_>) -> Result<(), VaultError> {
        let conn = self.conn.lock().expect("identity store mutex poisoned");
        let ts = now();
        if let Some(path) = update.current_path {
            conn.execute(
                "UPDATE identities SET current_path = ?1, updated_at = ?2 WHERE file_id = ?3",
                params![path, ts, file_id.to_string()],
            )?;
        }
        if let Some(hash) = update.hash {
            conn.execute(
                "UPDATE identities SET content_hash = ?1, updated_at = ?2 WHERE file_id = ?3",
                params![hash, ts, file_id.to_string()],
            )?;
        }
        if let Some(commit) = update.commit {
            conn.execute(
                "UPDATE identities SET last_commit = ?1, updated_at = ?2 WHERE file_id = ?3",
                params![commit, ts, file_id.to_string()],
            )?;
        }
        Ok(())
    }

    /// Append a rename to the path-history log (§3 "Path history entry").
    pub fn record_path_change(&self, file_id: Uuid, old_path: &str, new_path: &str) -> Result<(), VaultError> {
        let conn = self.conn.lock().expect("identity store mutex poisoned");
        conn.execute(
            "INSERT INTO path_history (file_id, old_path, new_path, changed_at) VALUES (?1, ?2, ?3, ?4)",
            params![file_id.to_string(), old_path, new_path, now()],
        )?;
        Ok(())
    }

    /// Soft-delete `file_id` (§4.2 `soft_delete`).
    pub fn soft_delete(&self, file_id: Uuid) -> Result<(), VaultError> {
        let conn = self.conn.lock().expect("identity store mutex poisoned");
        conn.execute(
            "UPDATE identities SET deleted_at = ?1, updated_at = ?1 WHERE file_id = ?2",
            params![now(), file_id.to_string()],
        )?;
        Ok(())
    }

    /// Every path `file_id` has ever lived at, oldest first, derived from
    /// the path-history log (§4.2 `all_previous_paths`).
    pub fn all_previous_paths(&self, file_id: Uuid) -> Result<Vec<String>, VaultError> {
        let conn = self.conn.lock().expect("identity store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT old_path FROM path_history WHERE file_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![file_id.to_string()], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// All active (non-deleted) records, used to build the disaster-recovery
    /// manifest (§4.2 `write_manifest`).
    pub fn all_active(&self) -> Result<Vec<IdentityRecord>, VaultError> {
        let conn = self.conn.lock().expect("identity store mutex poisoned");
        let mut stmt = conn.prepare("SELECT * FROM identities WHERE deleted_at IS NULL")?;
        let rows = stmt.query_map([], Self::row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Insert a record recovered from the disaster-recovery manifest, with
    /// an explicit `file_id` and `created_at` (§4.2 `rebuild_from_manifest`).
    /// No-op if `file_id` is already present.
    pub fn insert_recovered(&self, file_id: Uuid, path: &str, created_at: i64) -> Result<(), VaultError> {
        let conn = self.conn.lock().expect("identity store mutex poisoned");
        conn.execute(
            "INSERT OR IGNORE INTO identities (file_id, current_path, content_hash, last_commit, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, NULL, NULL, ?3, ?3, NULL)",
            params![file_id.to_string(), path, created_at],
        )?;
        Ok(())
    }

    /// Find the record most likely to correspond to `path`: first an active
    /// record whose current path matches, then (if none) the most recent
    /// path-history entry whose `old_path` or `new_path` matches, resolved
    /// to its (still-active) current record (§4.2 `find_by_any_path`).
    pub fn find_by_any_path(&self, path: &str) -> Result<Option<IdentityRecord>, VaultError> {
        if let Some(record) = self.get_by_path(path)? {
            return Ok(Some(record));
        }
        let conn = self.conn.lock().expect("identity store mutex poisoned");
        let file_id: Option<String> = conn
            .query_row(
                "SELECT file_id FROM path_history WHERE old_path = ?1 OR new_path = ?1 ORDER BY id DESC LIMIT 1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        drop(conn);
        match file_id {
            Some(id) => {
                let uuid = Uuid::parse_str(&id).map_err(|e| VaultError::fatal(format!("corrupt file_id in path history: {e}")))?;
                self.get_by_id(uuid)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_file_id_is_stable_across_calls() {
        let store = IdentityStore::open_in_memory().unwrap();
        let id1 = store.ensure_file_id("a.md", None, None).unwrap();
        let id2 = store.ensure_file_id("a.md", Some("hash"), Some("commit")).unwrap();
        assert_eq!(id1, id2);
        let record = store.get_by_path("a.md").unwrap().unwrap();
        assert_eq!(record.content_hash.as_deref(), Some("hash"));
        assert_eq!(record.last_commit.as_deref(), Some("commit"));
    }

    #[test]
    fn rename_preserves_file_id_and_records_history() {
        let store = IdentityStore::open_in_memory().unwrap();
        let id = store.ensure_file_id("old.md", None, None).unwrap();
        store.update(id, IdentityUpdate { current_path: Some("new.md"), hash: None, commit: None }).unwrap();
        store.record_path_change(id, "old.md", "new.md").unwrap();

        assert!(store.get_by_path("old.md").unwrap().is_none());
        let record = store.get_by_path("new.md").unwrap().unwrap();
        assert_eq!(record.file_id, id);
        assert_eq!(store.all_previous_paths(id).unwrap(), vec!["old.md".to_owned()]);
    }

    #[test]
    fn soft_delete_hides_from_lookups_and_never_revives() {
        let store = IdentityStore::open_in_memory().unwrap();
        let id = store.ensure_file_id("a.md", None, None).unwrap();
        store.soft_delete(id).unwrap();

        assert!(store.get_by_path("a.md").unwrap().is_none());
        assert!(store.get_by_id(id).unwrap().is_none());

        // A fresh create at the same path gets a new file_id.
        let id2 = store.ensure_file_id("a.md", None, None).unwrap();
        assert_ne!(id, id2);
    }

    #[test]
    fn find_by_any_path_falls_back_to_history() {
        let store = IdentityStore::open_in_memory().unwrap();
        let id = store.ensure_file_id("old.md", None, None).unwrap();
        store.update(id, IdentityUpdate { current_path: Some("new.md"), hash: None, commit: None }).unwrap();
        store.record_path_change(id, "old.md", "new.md").unwrap();

        let found = store.find_by_any_path("old.md").unwrap().unwrap();
        assert_eq!(found.file_id, id);
        assert_eq!(found.current_path, "new.md");
    }

    #[test]
    fn get_by_hash_returns_only_active_matches() {
        let store = IdentityStore::open_in_memory().unwrap();
        let id1 = store.ensure_file_id("a.md", Some("h1"), None).unwrap();
        let _id2 = store.ensure_file_id("b.md", Some("h1"), None).unwrap();
        store.soft_delete(id1).unwrap();

        let matches = store.get_by_hash("h1").unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].current_path, "b.md");
    }
}
