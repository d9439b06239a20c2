//! Vault and settings-store abstractions.
//!
//! The real vault (encryption, file format, UI) is an external collaborator.
//! Sync only needs the narrow surface the [`Vault`] trait exposes: list the
//! entries, apply individual changes, snapshot/restore for transactional
//! merge, and persist. [`SettingsStore`] is the local key-value store that
//! holds device identity, trust lists, the paired-device registry, and the
//! sync log.

mod memory;
mod settings;

pub mod mock;

pub use memory::MemoryVault;
pub use settings::{
    keys, JsonFileSettings, MemorySettings, SettingsError, SettingsResult, SettingsStore,
};

use vaultlink_types::VaultEntry;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors surfaced by a vault implementation.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// No vault is currently loaded/unlocked.
    #[error("no vault loaded")]
    NotLoaded,

    /// The referenced entry does not exist.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// An entry with the same uuid already exists.
    #[error("duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Persisting the vault failed.
    #[error("save failed: {0}")]
    SaveFailed(String),

    /// Backend storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}

/// A full point-in-time copy of the vault contents, used to roll back a
/// failed merge apply. Opaque to callers.
#[derive(Debug, Clone)]
pub struct VaultSnapshot {
    pub(crate) entries: Vec<VaultEntry>,
}

impl VaultSnapshot {
    /// Number of entries captured.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The narrow vault surface the sync subsystem depends on.
pub trait Vault: Send {
    /// Lists all entries, tombstones included.
    fn list_entries(&self) -> VaultResult<Vec<VaultEntry>>;

    /// Adds a new entry. Fails if the uuid already exists.
    fn apply_add(&mut self, entry: &VaultEntry) -> VaultResult<()>;

    /// Replaces an existing entry wholesale. Fails if the uuid is unknown.
    fn apply_update(&mut self, entry: &VaultEntry) -> VaultResult<()>;

    /// Logically deletes an entry: the record stays as a tombstone.
    fn apply_delete(&mut self, entry: &VaultEntry) -> VaultResult<()>;

    /// Captures a full snapshot of the current contents.
    fn snapshot(&self) -> VaultResult<VaultSnapshot>;

    /// Restores a previously captured snapshot in full.
    fn restore(&mut self, snapshot: VaultSnapshot) -> VaultResult<()>;

    /// Persists the vault.
    fn save(&mut self) -> VaultResult<()>;
}
