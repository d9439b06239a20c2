//! Trust monitor: gates sync on the current local-network identity.
//!
//! The OS-specific network identity reader is injected behind
//! [`NetworkIdSource`]. A source that cannot read the identity (platform
//! permission denied) returns `None`; that keeps sync gated off and is
//! surfaced as [`TrustState::Unavailable`] so the UI can prompt the user
//! instead of retrying silently.

use crate::error::SyncResult;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use vaultlink_types::TrustedNetwork;
use vaultlink_vault::{keys, SettingsStore};

/// How often the current network identity is polled.
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Reads the active local-network identity (SSID-equivalent).
pub trait NetworkIdSource: Send + Sync {
    /// The current network identity, or `None` when it cannot be read
    /// (no network, or the platform denied the permission).
    fn current_network(&self) -> Option<String>;
}

/// A source holding a settable value. Used in tests and by embedders that
/// push the identity in from platform callbacks.
#[derive(Debug, Default)]
pub struct FixedNetworkSource {
    current: Mutex<Option<String>>,
}

impl FixedNetworkSource {
    /// Creates a source with no current network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source pinned to the given network.
    #[must_use]
    pub fn on_network(ssid: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(Some(ssid.into())),
        }
    }

    /// Replaces the current network identity.
    pub fn set(&self, ssid: Option<String>) {
        *self.current.lock().unwrap() = ssid;
    }
}

impl NetworkIdSource for FixedNetworkSource {
    fn current_network(&self) -> Option<String> {
        self.current.lock().unwrap().clone()
    }
}

/// A network identity change: `(old, new)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustTransition {
    pub old: Option<String>,
    pub new: Option<String>,
}

impl TrustTransition {
    /// Whether the transition landed on a network.
    #[must_use]
    pub fn joined(&self) -> bool {
        self.new.is_some()
    }
}

/// The gate state as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustState {
    /// Current network is on the allow-list; sync may run.
    Trusted,
    /// On a network, but not an allow-listed one.
    Untrusted,
    /// The network identity cannot be read; sync stays gated off and the
    /// user must act (grant the permission or join a network).
    Unavailable,
}

struct TrustInner {
    current: Option<String>,
    trusted: Vec<TrustedNetwork>,
}

/// Observes the active network and maintains the trusted allow-list.
pub struct TrustMonitor {
    source: Arc<dyn NetworkIdSource>,
    settings: Arc<dyn SettingsStore>,
    inner: Mutex<TrustInner>,
    events: broadcast::Sender<TrustTransition>,
}

impl TrustMonitor {
    /// Creates a monitor, loading the persisted allow-list.
    pub fn new(
        source: Arc<dyn NetworkIdSource>,
        settings: Arc<dyn SettingsStore>,
    ) -> SyncResult<Self> {
        let trusted = keys::load_trusted_networks(settings.as_ref())?;
        let monitor = Self {
            source,
            settings,
            inner: Mutex::new(TrustInner {
                current: None,
                trusted,
            }),
            events: broadcast::channel(16).0,
        };
        // Prime the current network so is_trusted() is meaningful before
        // the first poll tick.
        monitor.check_now();
        Ok(monitor)
    }

    /// Subscribes to `(old, new)` network transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<TrustTransition> {
        self.events.subscribe()
    }

    /// The network we are currently on, if readable.
    pub fn current_network(&self) -> Option<String> {
        self.inner.lock().unwrap().current.clone()
    }

    /// Whether the current network is allow-listed.
    pub fn is_trusted(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        match &inner.current {
            Some(id) => inner.trusted.iter().any(|n| &n.ssid == id),
            None => false,
        }
    }

    /// The gate state, including the unreadable-identity case.
    pub fn state(&self) -> TrustState {
        let inner = self.inner.lock().unwrap();
        match &inner.current {
            None => TrustState::Unavailable,
            Some(id) if inner.trusted.iter().any(|n| &n.ssid == id) => TrustState::Trusted,
            Some(_) => TrustState::Untrusted,
        }
    }

    /// The allow-list with `is_current_network` flags up to date.
    pub fn trusted_networks(&self) -> Vec<TrustedNetwork> {
        self.inner.lock().unwrap().trusted.clone()
    }

    /// Allow-lists a network identity. Idempotent; persists immediately.
    pub fn add_trusted(&self, ssid: impl Into<String>) -> SyncResult<()> {
        let ssid = ssid.into();
        let mut inner = self.inner.lock().unwrap();
        if !inner.trusted.iter().any(|n| n.ssid == ssid) {
            let mut network = TrustedNetwork::new(&ssid);
            network.is_current_network = inner.current.as_deref() == Some(ssid.as_str());
            inner.trusted.push(network);
            keys::store_trusted_networks(self.settings.as_ref(), &inner.trusted)?;
            info!("trusted network added: {ssid}");
        }
        Ok(())
    }

    /// Removes a network identity from the allow-list.
    pub fn remove_trusted(&self, ssid: &str) -> SyncResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.trusted.len();
        inner.trusted.retain(|n| n.ssid != ssid);
        if inner.trusted.len() != before {
            keys::store_trusted_networks(self.settings.as_ref(), &inner.trusted)?;
            info!("trusted network removed: {ssid}");
        }
        Ok(())
    }

    /// Polls the source once. Recomputes `is_current_network` flags and, on
    /// a change, emits the `(old, new)` transition. Also the hook for
    /// OS-level change notifications.
    pub fn check_now(&self) -> Option<TrustTransition> {
        let observed = self.source.current_network();
        let mut inner = self.inner.lock().unwrap();

        for network in &mut inner.trusted {
            network.is_current_network = observed.as_deref() == Some(network.ssid.as_str());
        }

        if inner.current == observed {
            return None;
        }

        let transition = TrustTransition {
            old: inner.current.take(),
            new: observed.clone(),
        };
        inner.current = observed;
        drop(inner);

        debug!(?transition, "network transition");
        // Nobody listening is fine.
        let _ = self.events.send(transition.clone());
        Some(transition)
    }

    /// Runs the polling loop until cancelled. Each tick completes before the
    /// next is eligible, so polls never overlap.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("trust monitor stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.check_now();
                }
            }
        }
    }
}
