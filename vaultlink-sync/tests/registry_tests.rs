//! Device registry invariants: uniqueness, persistence, runtime flags.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use vaultlink_sync::DeviceRegistry;
use vaultlink_types::{DeviceId, PairedDevice};
use vaultlink_vault::{MemorySettings, SettingsStore};

fn registry() -> (Arc<dyn SettingsStore>, DeviceRegistry) {
    let settings: Arc<dyn SettingsStore> = Arc::new(MemorySettings::new());
    let registry = DeviceRegistry::new(settings.clone()).unwrap();
    (settings, registry)
}

#[test]
fn re_pairing_replaces_instead_of_duplicating() {
    let (_, registry) = registry();
    let id = DeviceId::new();

    registry.add(PairedDevice::new(id, "laptop", "pk-old")).unwrap();
    registry.add(PairedDevice::new(id, "laptop-renamed", "pk-new")).unwrap();

    let devices = registry.devices();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].name, "laptop-renamed");
    assert_eq!(devices[0].public_key, "pk-new");
}

#[test]
fn removal_is_a_noop_for_unknown_ids() {
    let (_, registry) = registry();
    registry.add(PairedDevice::new(DeviceId::new(), "laptop", "pk")).unwrap();
    registry.remove(DeviceId::new()).unwrap();
    assert_eq!(registry.devices().len(), 1);
}

#[test]
fn runtime_reachability_is_not_persisted() {
    let (settings, registry) = registry();
    let id = DeviceId::new();
    registry.add(PairedDevice::new(id, "laptop", "pk")).unwrap();
    registry
        .mark_online(id, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)), 4242)
        .unwrap();
    assert!(registry.get(id).unwrap().is_online);

    // A fresh registry over the same settings sees the device, offline.
    let reloaded = DeviceRegistry::new(settings).unwrap();
    let device = reloaded.get(id).unwrap();
    assert!(!device.is_online);
    assert!(device.address.is_none());
    assert!(device.port.is_none());
}

#[test]
fn reset_presence_clears_all_runtime_fields() {
    let (_, registry) = registry();
    let id = DeviceId::new();
    registry.add(PairedDevice::new(id, "laptop", "pk")).unwrap();
    registry
        .mark_online(id, IpAddr::V4(Ipv4Addr::LOCALHOST), 4242)
        .unwrap();

    registry.reset_presence();
    let device = registry.get(id).unwrap();
    assert!(!device.is_online);
    assert!(device.address.is_none());
}

#[test]
fn mark_synced_records_the_time() {
    let (_, registry) = registry();
    let id = DeviceId::new();
    registry.add(PairedDevice::new(id, "laptop", "pk")).unwrap();
    assert!(registry.get(id).unwrap().last_sync_at.is_none());

    registry.mark_synced(id).unwrap();
    assert!(registry.get(id).unwrap().last_sync_at.is_some());
}

#[test]
fn mutations_broadcast_the_new_device_list() {
    let (_, registry) = registry();
    let mut events = registry.subscribe();

    let id = DeviceId::new();
    registry.add(PairedDevice::new(id, "laptop", "pk")).unwrap();
    assert_eq!(events.try_recv().unwrap().len(), 1);

    registry.update_device_name(id, "work laptop").unwrap();
    assert_eq!(events.try_recv().unwrap()[0].name, "work laptop");

    registry.remove(id).unwrap();
    assert!(events.try_recv().unwrap().is_empty());
}
