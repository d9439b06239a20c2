use vaultlink_types::VaultEntry;
use vaultlink_vault::{mock::FlakyVault, MemoryVault, Vault, VaultError};

// ── Entry operations ─────────────────────────────────────────────

#[test]
fn add_list_update() {
    let mut vault = MemoryVault::new();
    let entry = VaultEntry::new("Gmail", "u1", "pw");
    vault.apply_add(&entry).unwrap();

    let listed = vault.list_entries().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].uuid, entry.uuid);

    let mut changed = entry.clone();
    changed.password = "pw2".into();
    vault.apply_update(&changed).unwrap();
    assert_eq!(vault.get(&entry.uuid).unwrap().password, "pw2");
}

#[test]
fn duplicate_add_fails() {
    let mut vault = MemoryVault::new();
    let entry = VaultEntry::new("t", "u", "p");
    vault.apply_add(&entry).unwrap();
    assert!(matches!(
        vault.apply_add(&entry),
        Err(VaultError::DuplicateEntry(_))
    ));
}

#[test]
fn update_unknown_entry_fails() {
    let mut vault = MemoryVault::new();
    let entry = VaultEntry::new("t", "u", "p");
    assert!(matches!(
        vault.apply_update(&entry),
        Err(VaultError::EntryNotFound(_))
    ));
}

#[test]
fn delete_leaves_tombstone() {
    let mut vault = MemoryVault::new();
    let entry = VaultEntry::new("t", "u", "p");
    vault.apply_add(&entry).unwrap();
    vault.apply_delete(&entry).unwrap();

    // Record still present, flagged deleted.
    assert_eq!(vault.len(), 1);
    assert!(vault.get(&entry.uuid).unwrap().deleted_flag);
}

// ── Snapshot / restore ───────────────────────────────────────────

#[test]
fn restore_returns_to_snapshot_state() {
    let a = VaultEntry::new("a", "u", "p");
    let mut vault = MemoryVault::with_entries([a.clone()]);

    let snap = vault.snapshot().unwrap();
    assert_eq!(snap.len(), 1);

    vault.apply_add(&VaultEntry::new("b", "u", "p")).unwrap();
    vault.apply_delete(&a).unwrap();
    assert_eq!(vault.len(), 2);

    vault.restore(snap).unwrap();
    let entries = vault.list_entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0], a);
}

// ── Failure injection ────────────────────────────────────────────

#[test]
fn flaky_vault_fails_nth_mutation() {
    let mut vault = FlakyVault::fail_on(MemoryVault::new(), 2);
    vault.apply_add(&VaultEntry::new("one", "u", "p")).unwrap();
    let err = vault.apply_add(&VaultEntry::new("two", "u", "p"));
    assert!(matches!(err, Err(VaultError::Storage(_))));
}

#[test]
fn flaky_save_fails() {
    let mut vault = FlakyVault::failing_save(MemoryVault::new());
    assert!(matches!(vault.save(), Err(VaultError::SaveFailed(_))));
}
