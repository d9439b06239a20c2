use std::net::{IpAddr, Ipv4Addr};
use vaultlink_types::{
    DeviceId, DeviceIdentity, ItemAction, PairedDevice, SyncLogEntry, TrustedNetwork,
};

// ── Device identity ──────────────────────────────────────────────

#[test]
fn identities_are_unique() {
    let a = DeviceIdentity::new("Laptop");
    let b = DeviceIdentity::new("Laptop");
    assert_ne!(a.id, b.id);
}

#[test]
fn device_id_roundtrips_as_string() {
    let id = DeviceId::new();
    let parsed = DeviceId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

// ── Paired devices ───────────────────────────────────────────────

#[test]
fn runtime_fields_are_not_persisted() {
    let mut dev = PairedDevice::new(DeviceId::new(), "Phone", "pk");
    dev.mark_online(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7)), 4040);

    let json = serde_json::to_value(&dev).unwrap();
    assert!(json.get("address").is_none());
    assert!(json.get("port").is_none());
    assert!(json.get("is_online").is_none());

    let back: PairedDevice = serde_json::from_value(json).unwrap();
    assert!(!back.is_online);
    assert!(back.address.is_none());
}

#[test]
fn mark_synced_updates_timestamps() {
    let mut dev = PairedDevice::new(DeviceId::new(), "Phone", "pk");
    assert!(dev.last_sync_at.is_none());
    dev.mark_synced();
    assert!(dev.last_sync_at.is_some());
}

// ── Trusted networks ─────────────────────────────────────────────

#[test]
fn trusted_network_equality_is_by_ssid() {
    let a = TrustedNetwork::new("HomeWifi");
    let mut b = TrustedNetwork::new("HomeWifi");
    b.is_current_network = true;
    assert_eq!(a, b);
    assert_ne!(a, TrustedNetwork::new("CoffeeShop"));
}

// ── Sync log ─────────────────────────────────────────────────────

#[test]
fn failure_entry_has_message_and_no_items() {
    let entry = SyncLogEntry::failure(DeviceId::new(), "Phone", "acct", "connection reset");
    assert!(!entry.success);
    assert_eq!(entry.error_message.as_deref(), Some("connection reset"));
    assert!(entry.items.is_empty());
}

#[test]
fn item_action_serializes_lowercase() {
    assert_eq!(
        serde_json::to_string(&ItemAction::Added).unwrap(),
        "\"added\""
    );
    assert_eq!(
        serde_json::to_string(&ItemAction::Modified).unwrap(),
        "\"modified\""
    );
    assert_eq!(
        serde_json::to_string(&ItemAction::Deleted).unwrap(),
        "\"deleted\""
    );
}
