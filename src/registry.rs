//! Process-scoped vault registry (§9 redesign note: "global, process-wide
//! CRDT stores and DB handle caches").
//!
//! The teacher's workspace registry caches one resource handle per
//! workspace, opened lazily and kept for the process lifetime; this mirrors
//! that shape per vault. Every accessor goes through [`VaultRegistry`], and
//! every mutation acquires the vault's [`VaultHandle::writer_lock`] before
//! touching the Content Store, Identity Store, disaster-recovery manifest,
//! or either CRDT (§5 "Per-vault writer lock").

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use vault_git::GixVaultRepo;

use crate::content_store::ContentStore;
use crate::crdt::structure::StructureCrdtStore;
use crate::crdt::text::TextCrdtStore;
use crate::error::VaultError;
use crate::identity_store::IdentityStore;
use crate::realtime::ChannelTable;
use crate::vault_name;

/// Every resource scoped to one vault, opened lazily and cached for the
/// process lifetime (§5 "Identity Store ... opened lazily, cached, WAL
/// mode").
pub struct VaultHandle {
    /// The vault's name, kept alongside its resources so background tasks
    /// (the fan-out heartbeat) can label messages without a registry
    /// round-trip.
    pub vault_name: String,
    /// Guards mutation of the Content Store, Identity Store, disaster
    /// recovery manifest, and either CRDT for this vault (§5).
    pub writer_lock: AsyncMutex<()>,
    /// This vault's Content Store.
    pub content: ContentStore,
    /// This vault's Identity Store.
    pub identity: IdentityStore,
    /// Per-file text CRDT documents, keyed by `file_id`.
    pub text_crdt: TextCrdtStore,
    /// The per-vault structure CRDT (`file_id -> entry` map).
    pub structure_crdt: StructureCrdtStore,
    /// Open fan-out channels for this vault, keyed by `device_id`.
    pub channels: ChannelTable,
}

/// Owns every open [`VaultHandle`] for the process's lifetime.
pub struct VaultRegistry {
    root: PathBuf,
    vaults: Mutex<HashMap<String, Arc<VaultHandle>>>,
}

/// Disaster recovery (§3 "Git-side manifest file", §4.2
/// `rebuild_from_manifest`): if the Identity Store has no active records —
/// e.g. `.scion/metadata.db` was lost or this is a freshly-cloned vault
/// directory — but the vault history carries a committed manifest, rebuild
/// the identity mapping from it rather than starting from an empty store
/// the next write would silently repopulate with fresh `file_id`s.
fn recover_identity_from_manifest_if_empty(content: &ContentStore, identity: &IdentityStore) -> Result<(), VaultError> {
    if !identity.all_active()?.is_empty() {
        return Ok(());
    }
    let Some(bytes) = content.read_current(crate::content_store::MANIFEST_PATH)? else {
        return Ok(());
    };
    let manifest = crate::identity_store::manifest::from_bytes(&bytes)?;
    crate::identity_store::manifest::rebuild_from_manifest(identity, &manifest)
}

impl VaultRegistry {
    /// Create a registry rooted at `VAULT_PATH` (§6).
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root, vaults: Mutex::new(HashMap::new()) }
    }

    /// Return the cached handle for `vault_name`, opening and `init`-ing it
    /// on first access. Validates `vault_name` first (§3 invariant 7: an
    /// invalid name never produces or mutates any state).
    pub fn get_or_init(&self, vault_name: &str) -> Result<Arc<VaultHandle>, VaultError> {
        vault_name::validate(vault_name)?;

        if let Some(handle) = self.vaults.lock().expect("vault registry mutex poisoned").get(vault_name) {
            return Ok(Arc::clone(handle));
        }

        let vault_dir = self.root.join(vault_name);
        std::fs::create_dir_all(&vault_dir)
            .map_err(|e| VaultError::fatal(format!("failed to create vault directory: {e}")))?;

        let repo = GixVaultRepo::open(&vault_dir)?;
        let content = ContentStore::new(Box::new(repo));
        content.init()?;

        let scion_dir = vault_dir.join(".scion");
        std::fs::create_dir_all(&scion_dir)
            .map_err(|e| VaultError::fatal(format!("failed to create .scion directory: {e}")))?;
        let identity = IdentityStore::open(&scion_dir.join("metadata.db"))?;
        recover_identity_from_manifest_if_empty(&content, &identity)?;

        let handle = Arc::new(VaultHandle {
            vault_name: vault_name.to_owned(),
            writer_lock: AsyncMutex::new(()),
            content,
            identity,
            text_crdt: TextCrdtStore::default(),
            structure_crdt: StructureCrdtStore::default(),
            channels: ChannelTable::default(),
        });

        let mut vaults = self.vaults.lock().expect("vault registry mutex poisoned");
        let handle = vaults.entry(vault_name.to_owned()).or_insert(handle);
        Ok(Arc::clone(handle))
    }

    /// Names of every vault opened so far this process (§6 `/ws/status`).
    pub fn open_vault_names(&self) -> Vec<String> {
        self.vaults.lock().expect("vault registry mutex poisoned").keys().cloned().collect()
    }

    /// A snapshot of every currently-cached handle, for the heartbeat task
    /// and the `/ws/status` endpoint to iterate without holding the
    /// registry lock.
    pub fn handles(&self) -> Vec<Arc<VaultHandle>> {
        self.vaults.lock().expect("vault registry mutex poisoned").values().cloned().collect()
    }
}
