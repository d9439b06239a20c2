//! Paired-device registry.
//!
//! Unique by device ID; every mutation persists the whole list through the
//! settings store and broadcasts the new state. Runtime reachability fields
//! live only in memory and are rebuilt from discovery each session.

use crate::error::SyncResult;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::info;
use vaultlink_types::{DeviceId, PairedDevice};
use vaultlink_vault::{keys, SettingsStore};

/// Holds the set of devices pairing has admitted.
pub struct DeviceRegistry {
    settings: Arc<dyn SettingsStore>,
    devices: Mutex<Vec<PairedDevice>>,
    events: broadcast::Sender<Vec<PairedDevice>>,
}

impl DeviceRegistry {
    /// Creates a registry, loading the persisted device list.
    pub fn new(settings: Arc<dyn SettingsStore>) -> SyncResult<Self> {
        let devices = keys::load_paired_devices(settings.as_ref())?;
        Ok(Self {
            settings,
            devices: Mutex::new(devices),
            events: broadcast::channel(16).0,
        })
    }

    /// Subscribes to registry snapshots, emitted after every mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<PairedDevice>> {
        self.events.subscribe()
    }

    /// The current device list.
    pub fn devices(&self) -> Vec<PairedDevice> {
        self.devices.lock().unwrap().clone()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.devices.lock().unwrap().is_empty()
    }

    /// Looks up a device by ID.
    pub fn get(&self, id: DeviceId) -> Option<PairedDevice> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned()
    }

    /// Whether the given peer has completed pairing.
    pub fn is_paired(&self, id: DeviceId) -> bool {
        self.devices.lock().unwrap().iter().any(|d| d.id == id)
    }

    /// Admits a device. Re-pairing an already known ID replaces the record
    /// (fresh name and key) rather than duplicating it.
    pub fn add(&self, device: PairedDevice) -> SyncResult<()> {
        let mut devices = self.devices.lock().unwrap();
        devices.retain(|d| d.id != device.id);
        info!(peer = %device.name, "device paired");
        devices.push(device);
        self.persist_and_notify(&devices)
    }

    /// Removes a device. Unknown IDs are a no-op.
    pub fn remove(&self, id: DeviceId) -> SyncResult<()> {
        let mut devices = self.devices.lock().unwrap();
        let before = devices.len();
        devices.retain(|d| d.id != id);
        if devices.len() == before {
            return Ok(());
        }
        info!(%id, "device unpaired");
        self.persist_and_notify(&devices)
    }

    /// Renames a known device.
    pub fn update_device_name(&self, id: DeviceId, name: impl Into<String>) -> SyncResult<()> {
        let mut devices = self.devices.lock().unwrap();
        if let Some(device) = devices.iter_mut().find(|d| d.id == id) {
            device.name = name.into();
            return self.persist_and_notify(&devices);
        }
        Ok(())
    }

    /// Annotates a device as reachable at the given address for this session.
    /// Updates `last_seen`, which is durable.
    pub fn mark_online(&self, id: DeviceId, address: IpAddr, port: u16) -> SyncResult<()> {
        let mut devices = self.devices.lock().unwrap();
        if let Some(device) = devices.iter_mut().find(|d| d.id == id) {
            device.mark_online(address, port);
            return self.persist_and_notify(&devices);
        }
        Ok(())
    }

    /// Records a successful sync with the device.
    pub fn mark_synced(&self, id: DeviceId) -> SyncResult<()> {
        let mut devices = self.devices.lock().unwrap();
        if let Some(device) = devices.iter_mut().find(|d| d.id == id) {
            device.mark_synced();
            return self.persist_and_notify(&devices);
        }
        Ok(())
    }

    /// Clears runtime reachability on all devices. Called when a discovery
    /// session ends so stale addresses never leak into the next one.
    pub fn reset_presence(&self) {
        let mut devices = self.devices.lock().unwrap();
        for device in devices.iter_mut() {
            device.is_online = false;
            device.address = None;
            device.port = None;
        }
        let _ = self.events.send(devices.clone());
    }

    fn persist_and_notify(&self, devices: &[PairedDevice]) -> SyncResult<()> {
        keys::store_paired_devices(self.settings.as_ref(), devices)?;
        let _ = self.events.send(devices.to_vec());
        Ok(())
    }
}
