//! Error types and terminal outcomes for the sync layer.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
///
/// Gate errors (not trusted, no devices, no vault) are locally recoverable by
/// user action and never retried automatically. Per-peer errors (handshake,
/// network, timeout) abort that peer only; the cycle continues with the rest.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The current network is not on the trusted allow-list.
    #[error("not on a trusted network")]
    NotOnTrustedNetwork,

    /// The paired-device registry is empty.
    #[error("no paired devices")]
    NoPairedDevices,

    /// No vault is loaded, so there is nothing to sync.
    #[error("no vault loaded")]
    NoVaultLoaded,

    /// A sync session is already active (single-flight guard).
    #[error("sync already in progress")]
    AlreadyInProgress,

    /// OS-level advertisement or scan failure.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// The peer rejected our identity or the account did not match.
    #[error("handshake rejected: {0}")]
    Handshake(String),

    /// Pairing failed (expired/mismatched token, unreachable peer).
    #[error(transparent)]
    Pairing(#[from] PairingError),

    /// Merge apply failed partway; the vault was rolled back in full.
    #[error("transaction failure: {0}")]
    Transaction(String),

    /// A suspension point exceeded its bound. Treated as a network error.
    #[error("operation timed out")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Protocol error (invalid message format).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Settings-store failure.
    #[error("settings error: {0}")]
    Settings(#[from] vaultlink_vault::SettingsError),

    /// Vault collaborator failure outside the transactional apply.
    #[error("vault error: {0}")]
    Vault(#[from] vaultlink_vault::VaultError),

    /// The session was cancelled at a yield point.
    #[error("cancelled")]
    Cancelled,
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::Network(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for SyncError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        SyncError::Timeout
    }
}

/// Pairing-specific failures. Idempotent to retry with a fresh payload.
#[derive(Debug, Error)]
pub enum PairingError {
    /// The payload's 5-minute validity window has passed.
    #[error("pairing payload expired")]
    Expired,

    /// The echoed token did not match the generated one.
    #[error("pairing token mismatch")]
    TokenMismatch,

    /// The token was already consumed or invalidated.
    #[error("pairing token already used")]
    TokenConsumed,

    /// The initiator named in the payload could not be reached.
    #[error("pairing peer unreachable: {0}")]
    Unreachable(String),

    /// The peer declined the pairing.
    #[error("pairing rejected by peer")]
    Rejected,

    /// A pairing attempt is already running.
    #[error("pairing already in progress")]
    AlreadyInProgress,
}

/// Terminal result of one orchestration cycle, surfaced to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncOutcome {
    /// At least one peer synced cleanly.
    Success,
    /// Discovery finished but no paired peer was online.
    NoDevicesFound,
    /// Gate: the current network is not trusted.
    NotOnTrustedNetwork,
    /// Gate: no vault is loaded.
    NoVaultLoaded,
    /// Every attempted peer failed.
    NetworkError,
    /// The cycle was cancelled at a yield point.
    Cancelled,
    /// Merge conflicts could not be resolved under the configured policy.
    ConflictError,
    /// Anything else.
    UnknownError,
}

impl From<&SyncError> for SyncOutcome {
    fn from(e: &SyncError) -> Self {
        match e {
            SyncError::NotOnTrustedNetwork => SyncOutcome::NotOnTrustedNetwork,
            SyncError::NoVaultLoaded => SyncOutcome::NoVaultLoaded,
            SyncError::NoPairedDevices => SyncOutcome::NoDevicesFound,
            SyncError::AlreadyInProgress | SyncError::Cancelled => SyncOutcome::Cancelled,
            SyncError::Timeout
            | SyncError::Network(_)
            | SyncError::Discovery(_)
            | SyncError::Handshake(_)
            | SyncError::Protocol(_) => SyncOutcome::NetworkError,
            SyncError::Transaction(_) => SyncOutcome::ConflictError,
            _ => SyncOutcome::UnknownError,
        }
    }
}
