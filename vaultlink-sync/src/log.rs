//! Sync history, capped at the most recent entries.

use crate::error::SyncResult;
use std::sync::Arc;
use tokio::sync::broadcast;
use vaultlink_types::SyncLogEntry;
use vaultlink_vault::{keys, SettingsStore};

/// Persistent, capped sync history with change notifications.
pub struct SyncLogStore {
    settings: Arc<dyn SettingsStore>,
    events: broadcast::Sender<SyncLogEntry>,
}

impl SyncLogStore {
    /// Creates a store over the given settings backend.
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            settings,
            events: broadcast::channel(32).0,
        }
    }

    /// Subscribes to newly appended entries.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncLogEntry> {
        self.events.subscribe()
    }

    /// The retained history, oldest first.
    pub fn entries(&self) -> SyncResult<Vec<SyncLogEntry>> {
        Ok(keys::load_sync_log(self.settings.as_ref())?)
    }

    /// Appends an entry, evicting the oldest beyond the cap.
    pub fn append(&self, entry: SyncLogEntry) -> SyncResult<()> {
        keys::append_sync_log(self.settings.as_ref(), entry.clone())?;
        let _ = self.events.send(entry);
        Ok(())
    }
}
