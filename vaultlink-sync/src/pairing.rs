//! Out-of-band pairing.
//!
//! The initiator binds a one-shot TCP listener, generates a time-boxed
//! single-use token, and presents the whole thing as a [`PairingPayload`]
//! (QR-style). The responder scans the payload, connects directly, and the
//! two exchange identities. Only the sha-256 of the token is retained in
//! memory after generation; cleartext tokens never reach logs.
//!
//! State machine, observable through a watch channel:
//! `Idle -> GeneratingIntroduction -> AwaitingPeer -> ExchangingIdentity ->
//! Completed | Failed`, then back to `Idle` via [`PairingService::reset`].

use crate::error::{PairingError, SyncError, SyncResult};
use crate::protocol::{pairing_validity, PairingPayload, PairingResponse, PROTOCOL_VERSION};
use crate::registry::DeviceRegistry;
use crate::wire::{self, CONNECT_TIMEOUT, READ_TIMEOUT};
use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vaultlink_types::{DeviceIdentity, PairedDevice};

/// Observable pairing progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    Idle,
    GeneratingIntroduction,
    AwaitingPeer,
    ExchangingIdentity,
    Completed,
    Failed,
}

/// Runs pairing exchanges and admits peers into the registry.
pub struct PairingService {
    identity: DeviceIdentity,
    registry: Arc<DeviceRegistry>,
    state: tokio::sync::watch::Sender<PairingState>,
    active: AtomicBool,
    used_tokens: Mutex<HashSet<String>>,
}

impl PairingService {
    /// Creates a pairing service for this identity.
    pub fn new(identity: DeviceIdentity, registry: Arc<DeviceRegistry>) -> Self {
        Self {
            identity,
            registry,
            state: tokio::sync::watch::channel(PairingState::Idle).0,
            active: AtomicBool::new(false),
            used_tokens: Mutex::new(HashSet::new()),
        }
    }

    /// Current state.
    pub fn state(&self) -> PairingState {
        *self.state.borrow()
    }

    /// Subscribes to state transitions.
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<PairingState> {
        self.state.subscribe()
    }

    /// Returns a terminal state to `Idle`. No-op while an exchange runs.
    pub fn reset(&self) {
        if !self.active.load(Ordering::SeqCst) {
            self.state.send_replace(PairingState::Idle);
        }
    }

    /// Initiator side: generates a payload and opens the one-shot listener.
    ///
    /// The returned [`PendingPairing`] carries the payload for display and
    /// must be driven with [`PendingPairing::await_peer`]; dropping it
    /// abandons the attempt.
    pub async fn begin(&self) -> SyncResult<PendingPairing<'_>> {
        let guard = self.acquire()?;
        self.state.send_replace(PairingState::GeneratingIntroduction);

        let listener = TcpListener::bind(("0.0.0.0", 0)).await?;
        let port = listener.local_addr()?.port();
        let ip_address = local_ip_address::local_ip()
            .map_err(|e| SyncError::Discovery(e.to_string()))?;

        let token = generate_token();
        let payload = PairingPayload {
            device_id: self.identity.id,
            device_name: self.identity.name.clone(),
            public_key: placeholder_key(),
            ip_address,
            port,
            generated_at: Utc::now(),
            pairing_token: token.clone(),
        };

        debug!(port, "pairing introduction generated");
        self.state.send_replace(PairingState::AwaitingPeer);
        Ok(PendingPairing {
            service: self,
            guard,
            listener,
            payload,
            token_hash: token_hash(&token),
        })
    }

    /// Responder side: consumes a scanned payload, connects to the
    /// initiator, and exchanges identities. Each payload's token is honored
    /// at most once by this service.
    pub async fn respond(
        &self,
        payload: &PairingPayload,
        cancel: &CancellationToken,
    ) -> SyncResult<PairedDevice> {
        let guard = self.acquire()?;

        if !payload.is_valid_at(Utc::now()) {
            guard.finish(PairingState::Failed);
            return Err(PairingError::Expired.into());
        }
        {
            let mut used = self.used_tokens.lock().unwrap();
            if !used.insert(token_hash(&payload.pairing_token)) {
                guard.finish(PairingState::Failed);
                return Err(PairingError::TokenConsumed.into());
            }
        }

        self.state.send_replace(PairingState::ExchangingIdentity);
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            r = self.respond_inner(payload) => r,
        };

        match &result {
            Ok(device) => {
                info!(peer = %device.name, "pairing completed");
                guard.finish(PairingState::Completed);
            }
            Err(SyncError::Cancelled) => {
                debug!("pairing cancelled");
                guard.finish(PairingState::Idle);
            }
            Err(e) => {
                warn!("pairing failed: {e}");
                guard.finish(PairingState::Failed);
            }
        }
        result
    }

    async fn respond_inner(&self, payload: &PairingPayload) -> SyncResult<PairedDevice> {
        let addr = (payload.ip_address, payload.port);
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| PairingError::Unreachable(format!("{}:{}", addr.0, addr.1)))?
            .map_err(|e| PairingError::Unreachable(e.to_string()))?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let response = PairingResponse {
            device_id: self.identity.id,
            device_name: self.identity.name.clone(),
            public_key: placeholder_key(),
            pairing_token: payload.pairing_token.clone(),
            accepted: true,
        };
        wire::write_message(&mut write_half, &response, READ_TIMEOUT).await?;

        let ack: PairingResponse = wire::read_message(&mut reader, READ_TIMEOUT).await?;
        if ack.pairing_token != payload.pairing_token {
            return Err(PairingError::TokenMismatch.into());
        }
        if !ack.accepted {
            return Err(PairingError::Rejected.into());
        }

        let mut device = PairedDevice::new(ack.device_id, ack.device_name, ack.public_key);
        device.mark_online(payload.ip_address, payload.port);
        self.registry.add(device.clone())?;
        Ok(device)
    }

    fn acquire(&self) -> SyncResult<ActiveGuard<'_>> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(PairingError::AlreadyInProgress.into());
        }
        Ok(ActiveGuard {
            service: self,
            finished: false,
        })
    }
}

/// Clears the single-flight flag however the exchange ends.
struct ActiveGuard<'a> {
    service: &'a PairingService,
    finished: bool,
}

impl ActiveGuard<'_> {
    fn finish(mut self, state: PairingState) {
        self.service.state.send_replace(state);
        self.finished = true;
        self.service.active.store(false, Ordering::SeqCst);
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.service.state.send_replace(PairingState::Idle);
            self.service.active.store(false, Ordering::SeqCst);
        }
    }
}

/// An initiator-side pairing attempt awaiting its responder.
pub struct PendingPairing<'a> {
    service: &'a PairingService,
    guard: ActiveGuard<'a>,
    listener: TcpListener,
    payload: PairingPayload,
    token_hash: String,
}

impl PendingPairing<'_> {
    /// The introduction to present to the user (QR or equivalent).
    pub fn payload(&self) -> &PairingPayload {
        &self.payload
    }

    /// Waits for exactly one responder within the payload's validity window.
    ///
    /// The first connection that echoes the correct token wins; its exchange
    /// consumes the token whether or not it then succeeds. A wrong token is
    /// rejected on the wire and fails the attempt.
    pub async fn await_peer(self, cancel: &CancellationToken) -> SyncResult<PairedDevice> {
        let deadline = self.payload.generated_at + pairing_validity();
        let window = (deadline - Utc::now())
            .to_std()
            .map_err(|_| PairingError::Expired)?;

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            r = tokio::time::timeout(window, self.exchange()) => match r {
                Ok(inner) => inner,
                Err(_) => Err(PairingError::Expired.into()),
            },
        };

        match &result {
            Ok(device) => {
                info!(peer = %device.name, "pairing completed");
                self.guard.finish(PairingState::Completed);
            }
            Err(SyncError::Cancelled) => {
                debug!("pairing cancelled");
                self.guard.finish(PairingState::Idle);
            }
            Err(e) => {
                warn!("pairing failed: {e}");
                self.guard.finish(PairingState::Failed);
            }
        }
        result
    }

    async fn exchange(&self) -> SyncResult<PairedDevice> {
        let (stream, peer_addr) = self.listener.accept().await?;
        self.service.state.send_replace(PairingState::ExchangingIdentity);
        debug!(%peer_addr, "pairing peer connected");

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let response: PairingResponse = wire::read_message(&mut reader, READ_TIMEOUT).await?;

        if token_hash(&response.pairing_token) != self.token_hash {
            let refusal = PairingResponse {
                device_id: self.service.identity.id,
                device_name: self.service.identity.name.clone(),
                public_key: placeholder_key(),
                pairing_token: response.pairing_token,
                accepted: false,
            };
            let _ = wire::write_message(&mut write_half, &refusal, READ_TIMEOUT).await;
            return Err(PairingError::TokenMismatch.into());
        }
        if !response.accepted {
            return Err(PairingError::Rejected.into());
        }

        let ack = PairingResponse {
            device_id: self.service.identity.id,
            device_name: self.service.identity.name.clone(),
            public_key: placeholder_key(),
            pairing_token: response.pairing_token.clone(),
            accepted: true,
        };
        wire::write_message(&mut write_half, &ack, READ_TIMEOUT).await?;

        let mut device =
            PairedDevice::new(response.device_id, response.device_name, response.public_key);
        device.mark_online(peer_addr.ip(), peer_addr.port());
        self.service.registry.add(device.clone())?;
        Ok(device)
    }
}

// The payload's redacted Debug keeps the token out of logs here too.
impl fmt::Debug for PendingPairing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingPairing")
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

/// 32 bytes of OS randomness, hex-encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn token_hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

// Key exchange is carried through the wire format but not yet used for
// payload encryption.
fn placeholder_key() -> String {
    format!("v{PROTOCOL_VERSION}-placeholder")
}
