//! Failure-injecting vault for testing transactional rollback.

use crate::{MemoryVault, Vault, VaultError, VaultResult, VaultSnapshot};
use vaultlink_types::VaultEntry;

/// Wraps a [`MemoryVault`] and fails the Nth mutation (add/update/delete,
/// counted together) with a storage error. Snapshot and restore never fail,
/// so rollback paths stay exercisable.
#[derive(Debug)]
pub struct FlakyVault {
    inner: MemoryVault,
    fail_on_mutation: Option<usize>,
    mutations: usize,
    fail_save: bool,
}

impl FlakyVault {
    /// Creates a wrapper that fails the `n`th mutation (1-based).
    #[must_use]
    pub fn fail_on(inner: MemoryVault, n: usize) -> Self {
        Self {
            inner,
            fail_on_mutation: Some(n),
            mutations: 0,
            fail_save: false,
        }
    }

    /// Creates a wrapper whose `save()` always fails.
    #[must_use]
    pub fn failing_save(inner: MemoryVault) -> Self {
        Self {
            inner,
            fail_on_mutation: None,
            mutations: 0,
            fail_save: true,
        }
    }

    /// Access to the wrapped vault for assertions.
    #[must_use]
    pub fn inner(&self) -> &MemoryVault {
        &self.inner
    }

    fn check_mutation(&mut self) -> VaultResult<()> {
        self.mutations += 1;
        if Some(self.mutations) == self.fail_on_mutation {
            return Err(VaultError::Storage(format!(
                "injected failure on mutation {}",
                self.mutations
            )));
        }
        Ok(())
    }
}

impl Vault for FlakyVault {
    fn list_entries(&self) -> VaultResult<Vec<VaultEntry>> {
        self.inner.list_entries()
    }

    fn apply_add(&mut self, entry: &VaultEntry) -> VaultResult<()> {
        self.check_mutation()?;
        self.inner.apply_add(entry)
    }

    fn apply_update(&mut self, entry: &VaultEntry) -> VaultResult<()> {
        self.check_mutation()?;
        self.inner.apply_update(entry)
    }

    fn apply_delete(&mut self, entry: &VaultEntry) -> VaultResult<()> {
        self.check_mutation()?;
        self.inner.apply_delete(entry)
    }

    fn snapshot(&self) -> VaultResult<VaultSnapshot> {
        self.inner.snapshot()
    }

    fn restore(&mut self, snapshot: VaultSnapshot) -> VaultResult<()> {
        self.inner.restore(snapshot)
    }

    fn save(&mut self) -> VaultResult<()> {
        if self.fail_save {
            return Err(VaultError::SaveFailed("injected save failure".into()));
        }
        self.inner.save()
    }
}
