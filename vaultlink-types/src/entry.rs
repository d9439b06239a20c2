//! Vault entry records as seen by the sync subsystem.
//!
//! The vault itself (encryption, rendering, editing) is an external
//! collaborator; sync only needs a serializable view of each entry with a
//! last-modified timestamp and a tombstone flag. Deletion is always logical
//! so that it can propagate to peers that still hold the entry live.

use crate::EntryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single credential entry.
///
/// `uuid` is the entry's identity. `(title, username)` is only a heuristic
/// natural key for duplicate detection and never used for identity.
/// Extensible metadata goes into the open `metadata` map rather than ad hoc
/// string keys on the struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultEntry {
    /// Entry identity, immutable for the entry's lifetime.
    pub uuid: EntryId,
    /// Display title.
    pub title: String,
    /// Account username.
    pub username: String,
    /// The secret itself (already decrypted by the vault collaborator).
    pub password: String,
    /// Associated URL, if any.
    #[serde(default)]
    pub url: Option<String>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// User tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Open metadata map for genuinely extensible fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Last modification time. Strict `>` decides "newer" during merge;
    /// equality is the sole trigger for conflict handling.
    pub last_modified: DateTime<Utc>,
    /// Tombstone flag. Set instead of removing the record.
    #[serde(default)]
    pub deleted_flag: bool,
}

impl VaultEntry {
    /// Creates a new live entry with a fresh uuid, stamped now.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            uuid: EntryId::new(),
            title: title.into(),
            username: username.into(),
            password: password.into(),
            url: None,
            notes: None,
            tags: Vec::new(),
            metadata: BTreeMap::new(),
            last_modified: Utc::now(),
            deleted_flag: false,
        }
    }

    /// Sets the URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Sets an explicit last-modified timestamp.
    #[must_use]
    pub fn with_last_modified(mut self, ts: DateTime<Utc>) -> Self {
        self.last_modified = ts;
        self
    }

    /// Marks the entry as a tombstone, stamping the deletion time.
    pub fn tombstone(&mut self, at: DateTime<Utc>) {
        self.deleted_flag = true;
        self.last_modified = at;
    }

    /// The natural key used for duplicate-detection heuristics only.
    #[must_use]
    pub fn natural_key(&self) -> (&str, &str) {
        (&self.title, &self.username)
    }

    /// Whether two copies of the same entry carry identical field content.
    /// The tombstone flag counts as content, so a deletion always differs
    /// from the live copy.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.title == other.title
            && self.username == other.username
            && self.password == other.password
            && self.url == other.url
            && self.notes == other.notes
            && self.tags == other.tags
            && self.metadata == other.metadata
            && self.deleted_flag == other.deleted_flag
    }

    /// Clones this entry as a conflict duplicate: fresh uuid and the peer's
    /// name appended to the title so both versions survive a tie.
    #[must_use]
    pub fn duplicate_from_peer(&self, peer_name: &str) -> Self {
        let mut dup = self.clone();
        dup.uuid = EntryId::new();
        dup.title = format!("{} (from {})", self.title, peer_name);
        dup
    }
}
