use chrono::{TimeZone, Utc};
use vaultlink_types::{EntryId, VaultEntry};

// ── Construction ─────────────────────────────────────────────────

#[test]
fn new_entry_is_live() {
    let e = VaultEntry::new("Gmail", "u1", "pw");
    assert!(!e.deleted_flag);
    assert_eq!(e.natural_key(), ("Gmail", "u1"));
    assert!(e.tags.is_empty());
    assert!(e.metadata.is_empty());
}

#[test]
fn builder_fields() {
    let e = VaultEntry::new("Site", "u", "p")
        .with_url("https://example.com")
        .with_notes("note");
    assert_eq!(e.url.as_deref(), Some("https://example.com"));
    assert_eq!(e.notes.as_deref(), Some("note"));
}

// ── Identifier ordering ──────────────────────────────────────────

#[test]
fn entry_ids_order_by_uuid_value() {
    let low = EntryId::parse("00000000-0000-0000-0000-000000000001").unwrap();
    let high = EntryId::parse("ffffffff-ffff-ffff-ffff-fffffffffffe").unwrap();
    assert!(low < high);

    let set: std::collections::BTreeSet<_> = [high, low].into();
    assert_eq!(set.into_iter().next(), Some(low));
}

// ── Content comparison ───────────────────────────────────────────

#[test]
fn same_content_ignores_uuid_and_timestamp() {
    let a = VaultEntry::new("t", "u", "p");
    let mut b = a.clone();
    b.uuid = EntryId::new();
    b.last_modified = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    assert!(a.same_content(&b));
}

#[test]
fn tombstone_counts_as_content() {
    let a = VaultEntry::new("t", "u", "p");
    let mut b = a.clone();
    b.tombstone(Utc::now());
    assert!(!a.same_content(&b));
}

#[test]
fn password_change_differs() {
    let a = VaultEntry::new("t", "u", "p1");
    let mut b = a.clone();
    b.password = "p2".into();
    assert!(!a.same_content(&b));
}

// ── Tombstoning ──────────────────────────────────────────────────

#[test]
fn tombstone_sets_flag_and_timestamp() {
    let mut e = VaultEntry::new("t", "u", "p");
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    e.tombstone(at);
    assert!(e.deleted_flag);
    assert_eq!(e.last_modified, at);
}

// ── Conflict duplication ─────────────────────────────────────────

#[test]
fn duplicate_from_peer_renames_and_reassigns_uuid() {
    let e = VaultEntry::new("Gmail", "u1", "pw");
    let dup = e.duplicate_from_peer("Laptop");
    assert_ne!(dup.uuid, e.uuid);
    assert_eq!(dup.title, "Gmail (from Laptop)");
    assert_eq!(dup.password, e.password);
}

// ── Serialization ────────────────────────────────────────────────

#[test]
fn wire_format_is_camel_case() {
    let e = VaultEntry::new("t", "u", "p");
    let json = serde_json::to_value(&e).unwrap();
    assert!(json.get("lastModified").is_some());
    assert!(json.get("deletedFlag").is_some());
    assert!(json.get("uuid").is_some());
}

#[test]
fn roundtrip_preserves_entry() {
    let mut e = VaultEntry::new("t", "u", "p").with_url("https://x");
    e.tags.push("work".into());
    e.metadata.insert("icon".into(), "key.png".into());
    let json = serde_json::to_string(&e).unwrap();
    let back: VaultEntry = serde_json::from_str(&json).unwrap();
    assert_eq!(back, e);
}

#[test]
fn unknown_wire_fields_are_ignored() {
    let e = VaultEntry::new("t", "u", "p");
    let mut json = serde_json::to_value(&e).unwrap();
    json.as_object_mut()
        .unwrap()
        .insert("futureField".into(), serde_json::json!(42));
    let back: VaultEntry = serde_json::from_value(json).unwrap();
    assert_eq!(back.title, "t");
}
