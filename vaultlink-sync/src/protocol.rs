//! Wire protocol messages.
//!
//! Every message is a single JSON object, newline-terminated for framing.
//! Field names are camelCase on the wire. Unknown fields are ignored for
//! forward compatibility.
//!
//! Flow after a connection is established:
//! 1. Initiator sends a handshake; the receiver verifies the device is
//!    paired and the account matches, replying ok or error.
//! 2. Both sides exchange their full entry sets.
//! 3. Each side runs the merge engine independently.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use vaultlink_types::{DeviceId, VaultEntry};

/// Protocol version advertised in presence records and pairing payloads.
pub const PROTOCOL_VERSION: u32 = 1;

/// How long a pairing payload stays valid after generation, in seconds.
pub const PAIRING_VALIDITY_SECS: i64 = 5 * 60;

/// The pairing validity window as a duration.
#[must_use]
pub fn pairing_validity() -> Duration {
    Duration::seconds(PAIRING_VALIDITY_SECS)
}

/// Initial handshake sent by the sync initiator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeRequest {
    /// Always `"handshake"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The initiator's device ID.
    pub device_id: DeviceId,
    /// The vault account being synced.
    pub account_name: String,
}

impl HandshakeRequest {
    /// Creates a handshake for the given identity and account.
    pub fn new(device_id: DeviceId, account_name: impl Into<String>) -> Self {
        Self {
            kind: "handshake".to_string(),
            device_id,
            account_name: account_name.into(),
        }
    }

    /// Whether the message carries the expected type tag.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.kind == "handshake"
    }
}

/// Receiver's reply to a handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeReply {
    /// `"ok"` or `"error"`.
    pub status: String,
    /// Rejection detail when status is `"error"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HandshakeReply {
    /// Accepting reply.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            message: None,
        }
    }

    /// Rejecting reply.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
        }
    }

    /// Whether the receiver accepted.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Full entry-set exchange, sent by both sides after a successful handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySetMessage {
    /// All entries, tombstones included.
    pub entries: Vec<VaultEntry>,
}

/// Out-of-band pairing introduction (QR-style payload). Single-use and
/// time-boxed; consumed by exactly one responder.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingPayload {
    /// The initiator's device ID.
    pub device_id: DeviceId,
    /// The initiator's device name.
    pub device_name: String,
    /// Public-key placeholder carried for future payload encryption.
    pub public_key: String,
    /// Directly reachable address of the initiator's pairing listener.
    pub ip_address: IpAddr,
    /// Port of the initiator's pairing listener.
    pub port: u16,
    /// Generation time; payload is valid for five minutes from here.
    pub generated_at: DateTime<Utc>,
    /// Fresh random token, echoed back by the responder.
    pub pairing_token: String,
}

impl PairingPayload {
    /// Whether the payload is still inside its validity window at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.generated_at + pairing_validity()
    }
}

// Tokens never reach logs in cleartext.
impl fmt::Debug for PairingPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingPayload")
            .field("device_id", &self.device_id)
            .field("device_name", &self.device_name)
            .field("ip_address", &self.ip_address)
            .field("port", &self.port)
            .field("generated_at", &self.generated_at)
            .field("pairing_token", &"<redacted>")
            .finish()
    }
}

/// Responder's message over TCP to the initiator, and the initiator's
/// acknowledgment back. The echoed token authenticates the responder; the
/// acknowledgment's `accepted` flag closes the exchange.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingResponse {
    /// The sender's device ID.
    pub device_id: DeviceId,
    /// The sender's device name.
    pub device_name: String,
    /// Public-key placeholder.
    pub public_key: String,
    /// The token from the payload, echoed back.
    pub pairing_token: String,
    /// Whether the sender accepts the pairing.
    pub accepted: bool,
}

impl fmt::Debug for PairingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingResponse")
            .field("device_id", &self.device_id)
            .field("device_name", &self.device_name)
            .field("accepted", &self.accepted)
            .field("pairing_token", &"<redacted>")
            .finish()
    }
}
