//! Local key-value settings store.
//!
//! Persists device identity, the paired-device registry, the trusted-network
//! allow-list, the sync log, and the auto/background sync flags. Writes are
//! whole-value replacements flushed immediately, so readers never observe a
//! half-applied update.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;
use vaultlink_types::{DeviceIdentity, PairedDevice, SyncLogEntry, TrustedNetwork, SYNC_LOG_CAP};

/// Result type for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Errors from the settings backend.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// String key-value store with immediate persistence.
pub trait SettingsStore: Send + Sync {
    /// Reads the value for a key.
    fn get(&self, key: &str) -> SettingsResult<Option<String>>;

    /// Writes a key as a whole-value replacement and persists it.
    fn set(&self, key: &str, value: &str) -> SettingsResult<()>;

    /// Removes a key.
    fn remove(&self, key: &str) -> SettingsResult<()>;
}

/// Well-known settings keys and typed accessors over any [`SettingsStore`].
pub mod keys {
    use super::*;

    pub const DEVICE_IDENTITY: &str = "device_identity";
    pub const PAIRED_DEVICES: &str = "paired_devices";
    pub const TRUSTED_NETWORKS: &str = "trusted_networks";
    pub const SYNC_LOG: &str = "sync_log";
    pub const AUTO_SYNC_ENABLED: &str = "auto_sync_enabled";
    pub const BACKGROUND_SYNC_ENABLED: &str = "background_sync_enabled";

    fn get_json<T: DeserializeOwned>(
        store: &dyn SettingsStore,
        key: &str,
    ) -> SettingsResult<Option<T>> {
        match store.get(key)? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(v) => Ok(Some(v)),
                Err(e) => {
                    // A corrupt value is treated as absent rather than fatal;
                    // the caller will regenerate and overwrite it.
                    warn!("discarding corrupt settings value for {key}: {e}");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(
        store: &dyn SettingsStore,
        key: &str,
        value: &T,
    ) -> SettingsResult<()> {
        store.set(key, &serde_json::to_string(value)?)
    }

    /// Loads the persisted device identity, if one exists.
    pub fn load_identity(store: &dyn SettingsStore) -> SettingsResult<Option<DeviceIdentity>> {
        get_json(store, DEVICE_IDENTITY)
    }

    /// Persists the device identity. Done once per installation.
    pub fn store_identity(
        store: &dyn SettingsStore,
        identity: &DeviceIdentity,
    ) -> SettingsResult<()> {
        set_json(store, DEVICE_IDENTITY, identity)
    }

    /// Loads (or generates and persists) the device identity.
    pub fn load_or_create_identity(
        store: &dyn SettingsStore,
        default_name: &str,
    ) -> SettingsResult<DeviceIdentity> {
        if let Some(identity) = load_identity(store)? {
            return Ok(identity);
        }
        let identity = DeviceIdentity::new(default_name);
        store_identity(store, &identity)?;
        Ok(identity)
    }

    /// Loads the paired-device registry.
    pub fn load_paired_devices(store: &dyn SettingsStore) -> SettingsResult<Vec<PairedDevice>> {
        Ok(get_json(store, PAIRED_DEVICES)?.unwrap_or_default())
    }

    /// Persists the paired-device registry wholesale.
    pub fn store_paired_devices(
        store: &dyn SettingsStore,
        devices: &[PairedDevice],
    ) -> SettingsResult<()> {
        set_json(store, PAIRED_DEVICES, &devices)
    }

    /// Loads the trusted-network allow-list.
    pub fn load_trusted_networks(
        store: &dyn SettingsStore,
    ) -> SettingsResult<Vec<TrustedNetwork>> {
        Ok(get_json(store, TRUSTED_NETWORKS)?.unwrap_or_default())
    }

    /// Persists the trusted-network allow-list wholesale.
    pub fn store_trusted_networks(
        store: &dyn SettingsStore,
        networks: &[TrustedNetwork],
    ) -> SettingsResult<()> {
        set_json(store, TRUSTED_NETWORKS, &networks)
    }

    /// Loads the sync log, newest last.
    pub fn load_sync_log(store: &dyn SettingsStore) -> SettingsResult<Vec<SyncLogEntry>> {
        Ok(get_json(store, SYNC_LOG)?.unwrap_or_default())
    }

    /// Appends a sync log entry, evicting the oldest beyond the cap.
    pub fn append_sync_log(
        store: &dyn SettingsStore,
        entry: SyncLogEntry,
    ) -> SettingsResult<()> {
        let mut log = load_sync_log(store)?;
        log.push(entry);
        if log.len() > SYNC_LOG_CAP {
            let excess = log.len() - SYNC_LOG_CAP;
            log.drain(..excess);
        }
        set_json(store, SYNC_LOG, &log)
    }

    /// Whether automatic sync triggers are enabled (defaults to true).
    pub fn auto_sync_enabled(store: &dyn SettingsStore) -> SettingsResult<bool> {
        Ok(get_json(store, AUTO_SYNC_ENABLED)?.unwrap_or(true))
    }

    /// Sets the auto-sync flag.
    pub fn set_auto_sync_enabled(store: &dyn SettingsStore, on: bool) -> SettingsResult<()> {
        set_json(store, AUTO_SYNC_ENABLED, &on)
    }

    /// Whether periodic background sync is enabled (defaults to false).
    pub fn background_sync_enabled(store: &dyn SettingsStore) -> SettingsResult<bool> {
        Ok(get_json(store, BACKGROUND_SYNC_ENABLED)?.unwrap_or(false))
    }

    /// Sets the background-sync flag.
    pub fn set_background_sync_enabled(
        store: &dyn SettingsStore,
        on: bool,
    ) -> SettingsResult<()> {
        set_json(store, BACKGROUND_SYNC_ENABLED, &on)
    }
}

/// In-memory settings store for tests and embedders with their own backend.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemorySettings {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> SettingsResult<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SettingsResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> SettingsResult<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Settings store persisted as a single JSON file. Every write rewrites the
/// whole file through a temp-and-rename so a crash never leaves it torn.
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileSettings {
    /// Opens (or creates) a settings file at the given path.
    pub fn open(path: impl Into<PathBuf>) -> SettingsResult<Self> {
        let path = path.into();
        let values = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("settings file unreadable, starting fresh: {e}");
                BTreeMap::new()
            })
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> SettingsResult<()> {
        let raw = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileSettings {
    fn get(&self, key: &str) -> SettingsResult<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SettingsResult<()> {
        let mut values = self.values.lock().unwrap();
        values.insert(key.to_string(), value.to_string());
        self.flush(&values)
    }

    fn remove(&self, key: &str) -> SettingsResult<()> {
        let mut values = self.values.lock().unwrap();
        values.remove(key);
        self.flush(&values)
    }
}
