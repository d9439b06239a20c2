//! Core type definitions for VaultLink.
//!
//! This crate defines the fundamental, transport-agnostic types used by the
//! synchronization subsystem:
//! - Device and entry identifiers
//! - Vault entry records (with tombstone flag)
//! - Durable device/trust records and ephemeral presence records
//! - The capped sync audit log
//!
//! Everything that touches the network or a vault implementation lives in
//! `vaultlink-sync` and `vaultlink-vault`, not here.

mod device;
mod entry;
mod ids;
mod sync_log;

pub use device::{DeviceIdentity, PairedDevice, PresenceRecord, TrustedNetwork};
pub use entry::VaultEntry;
pub use ids::{DeviceId, EntryId};
pub use sync_log::{ItemAction, SyncLogEntry, SyncLogItem, SYNC_LOG_CAP};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
