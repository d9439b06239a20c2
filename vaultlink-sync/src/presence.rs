//! LAN presence: DNS-SD advertisement and discovery.
//!
//! Each device advertises `_vaultlink._tcp` with its device ID, name, and
//! protocol version in the TXT record, on a freshly bound ephemeral TCP port.
//! Discovery browses the same service type, drops our own record and records
//! missing the TXT metadata, and resolves the rest into [`PresenceRecord`]s.
//! Presence is a liveness hint only; trust comes from the pairing registry.

use crate::error::{SyncError, SyncResult};
use crate::protocol::PROTOCOL_VERSION;
use crate::registry::DeviceRegistry;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use vaultlink_types::{DeviceIdentity, PairedDevice, PresenceRecord};

/// DNS-SD service type for this protocol.
pub const SERVICE_TYPE: &str = "_vaultlink._tcp.local.";

/// Default browse window for a discovery pass.
pub const DISCOVERY_WINDOW: Duration = Duration::from_secs(5);

/// Instance-name prefix; records not carrying it are foreign and dropped.
pub const INSTANCE_PREFIX: &str = "vaultlink-";

const TXT_DEVICE_ID: &str = "deviceId";
const TXT_DEVICE_NAME: &str = "deviceName";
const TXT_ACCOUNT: &str = "account";
const TXT_VERSION: &str = "version";

/// Advertises this device and discovers peers on the local network.
pub struct PresenceService {
    identity: DeviceIdentity,
    daemon: ServiceDaemon,
    registered: Mutex<Option<String>>,
}

impl PresenceService {
    /// Starts the mDNS daemon for the given identity.
    pub fn new(identity: DeviceIdentity) -> SyncResult<Self> {
        let daemon =
            ServiceDaemon::new().map_err(|e| SyncError::Discovery(e.to_string()))?;
        Ok(Self {
            identity,
            daemon,
            registered: Mutex::new(None),
        })
    }

    /// This device's identity.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Binds an ephemeral sync listener and advertises it over DNS-SD.
    ///
    /// At most one advertisement stands at a time; registering again
    /// without an [`unregister`](Self::unregister) is refused. On any
    /// failure nothing stays registered and no listener leaks; the caller
    /// may retry. The returned listener accepts inbound sync sessions for
    /// as long as the advertisement stands.
    pub async fn register(&self, account_name: Option<&str>) -> SyncResult<TcpListener> {
        if self.registered.lock().unwrap().is_some() {
            return Err(SyncError::Discovery("already advertising".into()));
        }
        let listener = TcpListener::bind(("0.0.0.0", 0)).await?;
        let port = listener.local_addr()?.port();

        let instance = format!("{INSTANCE_PREFIX}{}", self.identity.id);
        let host = format!("{instance}.local.");
        let mut txt = HashMap::from([
            (TXT_DEVICE_ID.to_string(), self.identity.id.to_string()),
            (TXT_DEVICE_NAME.to_string(), self.identity.name.clone()),
            (TXT_VERSION.to_string(), PROTOCOL_VERSION.to_string()),
        ]);
        if let Some(account) = account_name {
            txt.insert(TXT_ACCOUNT.to_string(), account.to_string());
        }

        let ip = local_ip_address::local_ip()
            .map(|a| a.to_string())
            .unwrap_or_default();
        let info = ServiceInfo::new(SERVICE_TYPE, &instance, &host, ip.as_str(), port, txt)
            .map_err(|e| SyncError::Discovery(e.to_string()))?
            .enable_addr_auto();
        let fullname = info.get_fullname().to_string();

        self.daemon
            .register(info)
            .map_err(|e| SyncError::Discovery(e.to_string()))?;

        info!(%instance, port, "presence advertised");
        *self.registered.lock().unwrap() = Some(fullname);
        Ok(listener)
    }

    /// Withdraws the advertisement. Idempotent; the listener returned by
    /// [`register`](Self::register) is the caller's to drop.
    pub fn unregister(&self) {
        if let Some(fullname) = self.registered.lock().unwrap().take() {
            if let Err(e) = self.daemon.unregister(&fullname) {
                warn!("presence unregister failed: {e}");
            }
        }
    }

    /// Browses for peers for the given window and returns every foreign
    /// record seen, deduplicated by device ID.
    pub async fn scan(&self, window: Duration) -> SyncResult<Vec<PresenceRecord>> {
        let receiver = self
            .daemon
            .browse(SERVICE_TYPE)
            .map_err(|e| SyncError::Discovery(e.to_string()))?;

        let mut seen: HashMap<_, PresenceRecord> = HashMap::new();
        let deadline = tokio::time::Instant::now() + window;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            let event = match tokio::time::timeout(remaining, receiver.recv_async()).await {
                Ok(Ok(event)) => event,
                // Window elapsed, or the daemon dropped the channel.
                Ok(Err(_)) | Err(_) => break,
            };
            if let ServiceEvent::ServiceResolved(info) = event {
                match self.record_from(&info) {
                    Some(record) => {
                        debug!(peer = %record.device_name, "peer resolved");
                        seen.insert(record.device_id, record);
                    }
                    None => debug!(name = info.get_fullname(), "ignoring record"),
                }
            }
        }

        if let Err(e) = self.daemon.stop_browse(SERVICE_TYPE) {
            warn!("stop browse failed: {e}");
        }
        Ok(seen.into_values().collect())
    }

    /// Scans for the window and returns the paired devices that are online,
    /// with live addresses written back into the registry.
    pub async fn discover_paired(
        &self,
        registry: &DeviceRegistry,
        window: Duration,
    ) -> SyncResult<Vec<PairedDevice>> {
        let mut online = Vec::new();
        for record in self.scan(window).await? {
            if !registry.is_paired(record.device_id) {
                debug!(peer = %record.device_name, "unpaired peer present, skipping");
                continue;
            }
            let Some(address) = record.address else {
                debug!(peer = %record.device_name, "peer resolved without address");
                continue;
            };
            registry.mark_online(record.device_id, address, record.port)?;
            if let Some(device) = registry.get(record.device_id) {
                online.push(device);
            }
        }
        Ok(online)
    }

    /// Parses a resolved service into a presence record. Returns `None` for
    /// our own advertisement, for instance names missing the protocol
    /// prefix, and for records without our TXT metadata.
    fn record_from(&self, info: &ServiceInfo) -> Option<PresenceRecord> {
        if !info.get_fullname().starts_with(INSTANCE_PREFIX) {
            return None;
        }
        let props = info.get_properties();
        let device_id = props
            .get_property_val_str(TXT_DEVICE_ID)
            .and_then(|s| s.parse().ok())?;
        if device_id == self.identity.id {
            return None;
        }
        let device_name = props.get_property_val_str(TXT_DEVICE_NAME)?.to_string();
        let account_name = props
            .get_property_val_str(TXT_ACCOUNT)
            .map(str::to_string);
        let address = info.get_addresses().iter().next().copied();
        Some(PresenceRecord {
            service_name: info.get_fullname().to_string(),
            device_id,
            device_name,
            account_name,
            address,
            port: info.get_port(),
        })
    }
}

impl Drop for PresenceService {
    fn drop(&mut self) {
        self.unregister();
        let _ = self.daemon.shutdown();
    }
}
