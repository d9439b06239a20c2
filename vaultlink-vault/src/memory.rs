//! In-memory vault implementation.

use crate::{Vault, VaultError, VaultResult, VaultSnapshot};
use std::collections::BTreeMap;
use vaultlink_types::{EntryId, VaultEntry};

/// A vault held entirely in memory. The reference implementation for tests
/// and for embedders whose real vault lives behind FFI.
#[derive(Debug, Default)]
pub struct MemoryVault {
    entries: BTreeMap<EntryId, VaultEntry>,
    /// Counts successful `save()` calls, for test assertions.
    save_count: usize,
}

impl MemoryVault {
    /// Creates an empty vault.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a vault pre-populated with entries.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = VaultEntry>) -> Self {
        let mut vault = Self::new();
        for e in entries {
            vault.entries.insert(e.uuid, e);
        }
        vault
    }

    /// Looks up an entry by uuid.
    #[must_use]
    pub fn get(&self, uuid: &EntryId) -> Option<&VaultEntry> {
        self.entries.get(uuid)
    }

    /// Number of records held, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the vault holds no records at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many times `save()` completed.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.save_count
    }
}

impl Vault for MemoryVault {
    fn list_entries(&self) -> VaultResult<Vec<VaultEntry>> {
        Ok(self.entries.values().cloned().collect())
    }

    fn apply_add(&mut self, entry: &VaultEntry) -> VaultResult<()> {
        if self.entries.contains_key(&entry.uuid) {
            return Err(VaultError::DuplicateEntry(entry.uuid.to_string()));
        }
        self.entries.insert(entry.uuid, entry.clone());
        Ok(())
    }

    fn apply_update(&mut self, entry: &VaultEntry) -> VaultResult<()> {
        if !self.entries.contains_key(&entry.uuid) {
            return Err(VaultError::EntryNotFound(entry.uuid.to_string()));
        }
        self.entries.insert(entry.uuid, entry.clone());
        Ok(())
    }

    fn apply_delete(&mut self, entry: &VaultEntry) -> VaultResult<()> {
        match self.entries.get_mut(&entry.uuid) {
            Some(existing) => {
                // Logical deletion: the record stays as a tombstone carrying
                // the deleting side's timestamp so it propagates correctly.
                let mut tombstoned = entry.clone();
                tombstoned.deleted_flag = true;
                *existing = tombstoned;
                Ok(())
            }
            None => Err(VaultError::EntryNotFound(entry.uuid.to_string())),
        }
    }

    fn snapshot(&self) -> VaultResult<VaultSnapshot> {
        Ok(VaultSnapshot {
            entries: self.entries.values().cloned().collect(),
        })
    }

    fn restore(&mut self, snapshot: VaultSnapshot) -> VaultResult<()> {
        self.entries = snapshot
            .entries
            .into_iter()
            .map(|e| (e.uuid, e))
            .collect();
        Ok(())
    }

    fn save(&mut self) -> VaultResult<()> {
        self.save_count += 1;
        Ok(())
    }
}
