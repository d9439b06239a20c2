//! Append-only sync audit log, capped at the most recent entries.

use crate::DeviceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of log entries retained; oldest evicted first.
pub const SYNC_LOG_CAP: usize = 20;

/// What happened to a single entry during a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemAction {
    Added,
    Modified,
    Deleted,
}

/// One changed item within a sync log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogItem {
    /// Title of the affected entry.
    pub entry_title: String,
    /// What was done to it.
    pub action: ItemAction,
    /// Name of the device the change came from.
    pub source_device: String,
}

/// One terminal sync outcome with a peer. Every completed cycle produces
/// exactly one of these per peer, success or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// Log entry ID.
    pub id: Uuid,
    /// When the sync finished.
    pub timestamp: DateTime<Utc>,
    /// The peer's device ID.
    pub peer_id: DeviceId,
    /// The peer's device name.
    pub peer_name: String,
    /// The vault account that synced.
    pub account_name: String,
    /// Per-entry changes applied locally.
    pub items: Vec<SyncLogItem>,
    /// Whether the sync completed cleanly.
    pub success: bool,
    /// Failure detail when `success` is false.
    pub error_message: Option<String>,
}

impl SyncLogEntry {
    /// Creates a successful log entry.
    #[must_use]
    pub fn success(
        peer_id: DeviceId,
        peer_name: impl Into<String>,
        account_name: impl Into<String>,
        items: Vec<SyncLogItem>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            peer_id,
            peer_name: peer_name.into(),
            account_name: account_name.into(),
            items,
            success: true,
            error_message: None,
        }
    }

    /// Creates a failed log entry.
    #[must_use]
    pub fn failure(
        peer_id: DeviceId,
        peer_name: impl Into<String>,
        account_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            peer_id,
            peer_name: peer_name.into(),
            account_name: account_name.into(),
            items: Vec::new(),
            success: false,
            error_message: Some(error.into()),
        }
    }
}
