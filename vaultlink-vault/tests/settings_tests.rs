use vaultlink_types::{DeviceId, PairedDevice, SyncLogEntry, TrustedNetwork, SYNC_LOG_CAP};
use vaultlink_vault::{keys, JsonFileSettings, MemorySettings, SettingsStore};

// ── Basic kv behavior ────────────────────────────────────────────

#[test]
fn set_get_remove() {
    let store = MemorySettings::new();
    assert!(store.get("k").unwrap().is_none());
    store.set("k", "v").unwrap();
    assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    store.remove("k").unwrap();
    assert!(store.get("k").unwrap().is_none());
}

// ── Identity bootstrap ───────────────────────────────────────────

#[test]
fn identity_generated_once_and_persisted() {
    let store = MemorySettings::new();
    let first = keys::load_or_create_identity(&store, "Laptop").unwrap();
    let second = keys::load_or_create_identity(&store, "Other Name").unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.name, "Laptop");
}

// ── Typed lists ──────────────────────────────────────────────────

#[test]
fn paired_devices_roundtrip() {
    let store = MemorySettings::new();
    assert!(keys::load_paired_devices(&store).unwrap().is_empty());

    let dev = PairedDevice::new(DeviceId::new(), "Phone", "pk");
    keys::store_paired_devices(&store, &[dev.clone()]).unwrap();

    let loaded = keys::load_paired_devices(&store).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, dev.id);
    assert!(!loaded[0].is_online);
}

#[test]
fn trusted_networks_roundtrip() {
    let store = MemorySettings::new();
    keys::store_trusted_networks(&store, &[TrustedNetwork::new("HomeWifi")]).unwrap();
    let loaded = keys::load_trusted_networks(&store).unwrap();
    assert_eq!(loaded, vec![TrustedNetwork::new("HomeWifi")]);
}

#[test]
fn corrupt_value_treated_as_absent() {
    let store = MemorySettings::new();
    store.set(keys::PAIRED_DEVICES, "not json at all").unwrap();
    assert!(keys::load_paired_devices(&store).unwrap().is_empty());
}

// ── Sync log cap ─────────────────────────────────────────────────

#[test]
fn sync_log_evicts_oldest_beyond_cap() {
    let store = MemorySettings::new();
    let peer = DeviceId::new();
    for i in 0..(SYNC_LOG_CAP + 5) {
        let entry = SyncLogEntry::failure(peer, format!("peer-{i}"), "acct", "x");
        keys::append_sync_log(&store, entry).unwrap();
    }
    let log = keys::load_sync_log(&store).unwrap();
    assert_eq!(log.len(), SYNC_LOG_CAP);
    // Oldest evicted first: the first retained entry is number 5.
    assert_eq!(log[0].peer_name, "peer-5");
}

// ── Flags ────────────────────────────────────────────────────────

#[test]
fn flag_defaults() {
    let store = MemorySettings::new();
    assert!(keys::auto_sync_enabled(&store).unwrap());
    assert!(!keys::background_sync_enabled(&store).unwrap());

    keys::set_auto_sync_enabled(&store, false).unwrap();
    keys::set_background_sync_enabled(&store, true).unwrap();
    assert!(!keys::auto_sync_enabled(&store).unwrap());
    assert!(keys::background_sync_enabled(&store).unwrap());
}

// ── File persistence ─────────────────────────────────────────────

#[test]
fn json_file_settings_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    {
        let store = JsonFileSettings::open(&path).unwrap();
        store.set("device_name", "Laptop").unwrap();
    }

    let reopened = JsonFileSettings::open(&path).unwrap();
    assert_eq!(
        reopened.get("device_name").unwrap().as_deref(),
        Some("Laptop")
    );
}
