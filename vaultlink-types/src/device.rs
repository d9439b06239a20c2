//! Device, trust, and presence records.
//!
//! `PairedDevice` and `TrustedNetwork` are durable (persisted through the
//! settings store, minus runtime-only fields). `PresenceRecord` is ephemeral
//! and lives only for the duration of a discovery session.

use crate::DeviceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// This installation's identity. Generated once, persisted for the lifetime
/// of the installation, and used to filter out self-discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Stable, opaque device ID.
    pub id: DeviceId,
    /// Human-readable device name.
    pub name: String,
}

impl DeviceIdentity {
    /// Creates a fresh identity with a random ID.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: DeviceId::new(),
            name: name.into(),
        }
    }
}

/// A device that completed the pairing handshake.
///
/// The registry never holds two entries with the same `id`. Runtime fields
/// (`is_online`, `address`, `port`) are rebuilt from discovery each session
/// and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairedDevice {
    /// The peer's device ID.
    pub id: DeviceId,
    /// The peer's device name.
    pub name: String,
    /// Placeholder for a future public-key exchange; carried through the
    /// pairing wire format but not yet used for payload encryption.
    pub public_key: String,
    /// When pairing completed.
    pub paired_at: DateTime<Utc>,
    /// When the peer was last seen on the network.
    pub last_seen: DateTime<Utc>,
    /// When we last synced successfully with this peer.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Whether the peer is currently reachable (runtime only).
    #[serde(skip)]
    pub is_online: bool,
    /// Resolved address for this session (runtime only).
    #[serde(skip)]
    pub address: Option<IpAddr>,
    /// Resolved sync port for this session (runtime only).
    #[serde(skip)]
    pub port: Option<u16>,
}

impl PairedDevice {
    /// Creates a freshly paired device record.
    #[must_use]
    pub fn new(id: DeviceId, name: impl Into<String>, public_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            public_key: public_key.into(),
            paired_at: now,
            last_seen: now,
            last_sync_at: None,
            is_online: false,
            address: None,
            port: None,
        }
    }

    /// Annotates this record with a live address from discovery.
    pub fn mark_online(&mut self, address: IpAddr, port: u16) {
        self.is_online = true;
        self.address = Some(address);
        self.port = Some(port);
        self.last_seen = Utc::now();
    }

    /// Records a successful sync.
    pub fn mark_synced(&mut self) {
        let now = Utc::now();
        self.last_sync_at = Some(now);
        self.last_seen = now;
    }
}

/// A local-network identity the user explicitly allow-listed for sync.
/// Equality is by network id (SSID-equivalent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedNetwork {
    /// The network identity (SSID-equivalent).
    pub ssid: String,
    /// When the user trusted it.
    pub added_at: DateTime<Utc>,
    /// Whether this is the network we are currently on (runtime only).
    #[serde(skip)]
    pub is_current_network: bool,
}

impl TrustedNetwork {
    /// Creates a trusted-network record for the given identity.
    #[must_use]
    pub fn new(ssid: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            added_at: Utc::now(),
            is_current_network: false,
        }
    }
}

impl PartialEq for TrustedNetwork {
    fn eq(&self, other: &Self) -> bool {
        self.ssid == other.ssid
    }
}

impl Eq for TrustedNetwork {}

/// An ephemeral descriptor of a peer advertising this protocol.
/// Never persisted; lifetime bounded by the discovery session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRecord {
    /// Full advertised instance name.
    pub service_name: String,
    /// The peer's device ID (from TXT metadata).
    pub device_id: DeviceId,
    /// The peer's device name (from TXT metadata).
    pub device_name: String,
    /// Vault account advertised by the peer, if any.
    pub account_name: Option<String>,
    /// Cached address, if resolution already happened.
    pub address: Option<IpAddr>,
    /// Advertised sync port.
    pub port: u16,
}
