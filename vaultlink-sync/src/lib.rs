//! Peer-to-peer vault synchronization over the local network.
//!
//! Sync is LAN-only and gated on an explicit trust decision: the user
//! allow-lists networks, pairs devices out of band, and only then do paired
//! peers exchange entry sets. There is no relay and no cloud; two devices
//! converge by each running the same deterministic merge over the two sets.
//!
//! The pieces, wired together by [`SyncOrchestrator`]:
//! - [`TrustMonitor`] watches the current network against the allow-list.
//! - [`PresenceService`] advertises and discovers peers over DNS-SD.
//! - [`PairingService`] admits new devices with a time-boxed one-shot token.
//! - [`DeviceRegistry`] persists the admitted peers.
//! - [`MergeEngine`] reconciles entry sets and applies changes
//!   transactionally.

mod error;
mod log;
mod merge;
mod orchestrator;
mod pairing;
mod presence;
mod protocol;
mod registry;
mod trust;
mod wire;

pub use error::{PairingError, SyncError, SyncOutcome, SyncResult};
pub use log::SyncLogStore;
pub use merge::{
    AppliedSummary, Conflict, ConflictPolicy, EntryChange, MergeEngine, MergePlan,
};
pub use orchestrator::{
    OrchestratorConfig, SessionState, SyncEvent, SyncOrchestrator, SyncTrigger,
};
pub use pairing::{PairingService, PairingState, PendingPairing};
pub use presence::{PresenceService, DISCOVERY_WINDOW, INSTANCE_PREFIX, SERVICE_TYPE};
pub use protocol::{
    pairing_validity, EntrySetMessage, HandshakeReply, HandshakeRequest, PairingPayload,
    PairingResponse, PAIRING_VALIDITY_SECS, PROTOCOL_VERSION,
};
pub use registry::DeviceRegistry;
pub use trust::{
    FixedNetworkSource, NetworkIdSource, TrustMonitor, TrustState, TrustTransition,
};
pub use wire::{MAX_MESSAGE_SIZE, READ_TIMEOUT};
