//! Sync orchestration: gates, discovery, per-peer sessions, history.
//!
//! One cycle runs the fixed sequence: trust gate, vault gate, registry gate,
//! discovery, then one session per online peer. Sessions are sequential and
//! failure-isolated; one peer failing never aborts the rest. A single-flight
//! guard covers outbound cycles and inbound sessions alike, so at most one
//! session touches the vault at a time. Cancellation is cooperative and only
//! observed between steps; the vault's transactional apply is never torn.

use crate::error::{SyncError, SyncOutcome, SyncResult};
use crate::log::SyncLogStore;
use crate::merge::{AppliedSummary, ConflictPolicy, MergeEngine};
use crate::presence::{PresenceService, DISCOVERY_WINDOW};
use crate::protocol::{EntrySetMessage, HandshakeReply, HandshakeRequest};
use crate::registry::DeviceRegistry;
use crate::trust::TrustMonitor;
use crate::wire::{self, CONNECT_TIMEOUT, READ_TIMEOUT};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vaultlink_types::{DeviceIdentity, PairedDevice, SyncLogEntry};
use vaultlink_vault::{keys, SettingsStore, Vault};

/// What kicked off a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Explicit user request.
    Manual,
    /// Debounced arrival on a trusted network.
    NetworkJoined,
    /// Periodic background timer.
    Periodic,
    /// App returned to the foreground.
    Foreground,
}

/// Coarse orchestrator state, observable through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Discovering,
    Syncing,
    Paused,
    Error,
}

/// Notifications emitted while a cycle runs.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Started(SyncTrigger),
    PeerSynced {
        peer_name: String,
        added: usize,
        modified: usize,
        deleted: usize,
    },
    PeerFailed {
        peer_name: String,
        error: String,
    },
    Finished(SyncOutcome),
}

/// Tunables for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// The vault account this device syncs. Handshakes for any other
    /// account are rejected.
    pub account_name: String,
    /// Conflict policy handed to the merge engine.
    pub conflict_policy: ConflictPolicy,
    /// Browse window per discovery pass.
    pub discovery_window: Duration,
    /// Interval of the background timer (gated by the background flag).
    pub periodic_interval: Duration,
    /// Settle time between a network transition and the triggered cycle.
    pub trigger_debounce: Duration,
}

impl OrchestratorConfig {
    /// Defaults for the given account.
    pub fn new(account_name: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            conflict_policy: ConflictPolicy::default(),
            discovery_window: DISCOVERY_WINDOW,
            periodic_interval: Duration::from_secs(15 * 60),
            trigger_debounce: Duration::from_secs(3),
        }
    }
}

/// Drives sync cycles over the injected collaborators.
pub struct SyncOrchestrator {
    config: OrchestratorConfig,
    identity: DeviceIdentity,
    settings: Arc<dyn SettingsStore>,
    vault: Arc<Mutex<Option<Box<dyn Vault>>>>,
    registry: Arc<DeviceRegistry>,
    trust: Arc<TrustMonitor>,
    presence: Arc<PresenceService>,
    log: SyncLogStore,
    engine: MergeEngine,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SyncEvent>,
    busy: AtomicBool,
    paused: AtomicBool,
    session_cancel: Mutex<Option<CancellationToken>>,
    runtime: Mutex<Option<CancellationToken>>,
}

impl SyncOrchestrator {
    /// Wires an orchestrator from its collaborators. Nothing runs until
    /// [`start`](Self::start) or an explicit [`sync_now`](Self::sync_now).
    pub fn new(
        config: OrchestratorConfig,
        identity: DeviceIdentity,
        settings: Arc<dyn SettingsStore>,
        registry: Arc<DeviceRegistry>,
        trust: Arc<TrustMonitor>,
        presence: Arc<PresenceService>,
    ) -> Arc<Self> {
        let engine = MergeEngine::new(config.conflict_policy);
        Arc::new(Self {
            config,
            identity,
            settings: settings.clone(),
            vault: Arc::new(Mutex::new(None)),
            registry,
            trust,
            presence,
            log: SyncLogStore::new(settings),
            engine,
            state: watch::channel(SessionState::Idle).0,
            events: broadcast::channel(64).0,
            busy: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            session_cancel: Mutex::new(None),
            runtime: Mutex::new(None),
        })
    }

    /// Subscribes to cycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Subscribes to state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// The sync history store.
    pub fn sync_log(&self) -> &SyncLogStore {
        &self.log
    }

    /// Hands the unlocked vault to the orchestrator.
    pub fn load_vault(&self, vault: Box<dyn Vault>) {
        *self.vault.lock().unwrap() = Some(vault);
    }

    /// Detaches the vault (locked or closed). Gated cycles fail with
    /// `NoVaultLoaded` until one is loaded again.
    pub fn unload_vault(&self) -> Option<Box<dyn Vault>> {
        self.vault.lock().unwrap().take()
    }

    /// Runs a closure against the loaded vault.
    pub fn with_vault<T>(
        &self,
        f: impl FnOnce(&mut dyn Vault) -> SyncResult<T>,
    ) -> SyncResult<T> {
        let mut guard = self.vault.lock().unwrap();
        let vault = guard.as_mut().ok_or(SyncError::NoVaultLoaded)?;
        f(vault.as_mut())
    }

    /// Suppresses automatic triggers. Manual sync stays available.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        if !self.busy.load(Ordering::SeqCst) {
            self.state.send_replace(SessionState::Paused);
        }
    }

    /// Re-enables automatic triggers.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        if !self.busy.load(Ordering::SeqCst) {
            self.state.send_replace(SessionState::Idle);
        }
    }

    /// Requests cancellation of the in-flight cycle, if any. The cycle
    /// stops at its next yield point; applied merges are never unwound.
    pub fn cancel(&self) {
        if let Some(token) = self.session_cancel.lock().unwrap().as_ref() {
            token.cancel();
        }
    }

    /// Runs one cycle now. Every terminal outcome is returned as `Ok`;
    /// the only error is the single-flight rejection.
    pub async fn sync_now(&self) -> SyncResult<SyncOutcome> {
        self.run_cycle(SyncTrigger::Manual).await
    }

    /// Foreground trigger: runs a cycle when auto-sync is on and nothing
    /// else is running. Quiet no-op otherwise.
    pub async fn on_foreground(&self) {
        if self.paused.load(Ordering::SeqCst) || !self.auto_sync() {
            return;
        }
        match self.run_cycle(SyncTrigger::Foreground).await {
            Ok(outcome) => debug!(?outcome, "foreground sync finished"),
            Err(SyncError::AlreadyInProgress) => {}
            Err(e) => warn!("foreground sync failed: {e}"),
        }
    }

    /// Advertises presence, serves inbound sessions, watches the network,
    /// and runs automatic triggers until the returned token is cancelled.
    /// Calling again while running is a no-op returning the same token.
    pub async fn start(self: Arc<Self>) -> SyncResult<CancellationToken> {
        {
            let mut runtime = self.runtime.lock().unwrap();
            match runtime.take() {
                Some(existing) if !existing.is_cancelled() => {
                    let token = existing.clone();
                    *runtime = Some(existing);
                    return Ok(token);
                }
                // A cancelled runtime leaves its advertisement standing.
                Some(_) => self.presence.unregister(),
                None => {}
            }
        }

        let cancel = CancellationToken::new();
        let listener = self
            .presence
            .register(Some(&self.config.account_name))
            .await?;
        *self.runtime.lock().unwrap() = Some(cancel.clone());

        tokio::spawn(self.clone().serve(listener, cancel.clone()));
        tokio::spawn(self.trust.clone().run(cancel.clone()));
        tokio::spawn(self.clone().run_triggers(cancel.clone()));
        Ok(cancel)
    }

    async fn run_cycle(&self, trigger: SyncTrigger) -> SyncResult<SyncOutcome> {
        let guard = BusyGuard::acquire(self)?;
        let cancel = CancellationToken::new();
        *self.session_cancel.lock().unwrap() = Some(cancel.clone());

        info!(?trigger, "sync cycle started");
        let _ = self.events.send(SyncEvent::Started(trigger));

        let outcome = self.cycle_inner(&cancel).await;

        *self.session_cancel.lock().unwrap() = None;
        // Gate rejections are user-recoverable states; only network and
        // merge failures surface as Error.
        let terminal = match outcome {
            SyncOutcome::Success
            | SyncOutcome::NoDevicesFound
            | SyncOutcome::Cancelled
            | SyncOutcome::NotOnTrustedNetwork
            | SyncOutcome::NoVaultLoaded => SessionState::Idle,
            _ => SessionState::Error,
        };
        guard.finish(terminal);
        info!(?outcome, "sync cycle finished");
        let _ = self.events.send(SyncEvent::Finished(outcome));
        Ok(outcome)
    }

    async fn cycle_inner(&self, cancel: &CancellationToken) -> SyncOutcome {
        if !self.trust.is_trusted() {
            return SyncOutcome::NotOnTrustedNetwork;
        }
        if self.vault.lock().unwrap().is_none() {
            return SyncOutcome::NoVaultLoaded;
        }
        if self.registry.is_empty() {
            return SyncOutcome::NoDevicesFound;
        }

        self.state.send_replace(SessionState::Discovering);
        let peers = match with_cancel(
            cancel,
            self.presence
                .discover_paired(&self.registry, self.config.discovery_window),
        )
        .await
        {
            Ok(peers) => peers,
            Err(SyncError::Cancelled) => return SyncOutcome::Cancelled,
            Err(e) => {
                warn!("discovery failed: {e}");
                return SyncOutcome::NetworkError;
            }
        };
        if peers.is_empty() {
            return SyncOutcome::NoDevicesFound;
        }

        self.state.send_replace(SessionState::Syncing);
        let mut any_success = false;
        let mut first_error: Option<SyncError> = None;

        for peer in &peers {
            if cancel.is_cancelled() {
                return SyncOutcome::Cancelled;
            }
            match self.sync_with_peer(peer, cancel).await {
                Ok(summary) => {
                    any_success = true;
                    self.record_success(peer, &summary);
                }
                Err(SyncError::Cancelled) => {
                    self.record_failure(peer, &SyncError::Cancelled);
                    return SyncOutcome::Cancelled;
                }
                Err(e) => {
                    self.record_failure(peer, &e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if any_success {
            SyncOutcome::Success
        } else {
            match &first_error {
                Some(e) => SyncOutcome::from(e),
                None => SyncOutcome::NoDevicesFound,
            }
        }
    }

    /// One outbound session: connect, handshake, exchange, merge, apply.
    async fn sync_with_peer(
        &self,
        peer: &PairedDevice,
        cancel: &CancellationToken,
    ) -> SyncResult<AppliedSummary> {
        let (address, port) = match (peer.address, peer.port) {
            (Some(a), Some(p)) => (a, p),
            _ => return Err(SyncError::Network("peer has no resolved address".into())),
        };

        debug!(peer = %peer.name, %address, port, "connecting");
        let stream = with_cancel(cancel, async {
            Ok(tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((address, port)))
                .await??)
        })
        .await?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let request = HandshakeRequest::new(self.identity.id, &self.config.account_name);
        wire::write_message(&mut write_half, &request, READ_TIMEOUT).await?;
        let reply: HandshakeReply =
            with_cancel(cancel, wire::read_message(&mut reader, READ_TIMEOUT)).await?;
        if !reply.is_ok() {
            return Err(SyncError::Handshake(
                reply.message.unwrap_or_else(|| "rejected".into()),
            ));
        }

        let local = self.with_vault(|v| Ok(v.list_entries()?))?;
        wire::write_message(
            &mut write_half,
            &EntrySetMessage { entries: local.clone() },
            READ_TIMEOUT,
        )
        .await?;
        let remote: EntrySetMessage =
            with_cancel(cancel, wire::read_message(&mut reader, READ_TIMEOUT)).await?;

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let plan = self.engine.diff(&local, &remote.entries, &peer.name);
        let summary = self.with_vault(|v| self.engine.apply(v, &plan.local_changes, &peer.name))?;
        self.registry.mark_synced(peer.id)?;
        Ok(summary)
    }

    /// Accepts inbound sessions for as long as the token lives.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("inbound listener stopped");
                    return;
                }
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("accept failed: {e}");
                        continue;
                    }
                },
            };
            debug!(%peer_addr, "inbound connection");
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.handle_inbound(stream).await {
                    warn!(%peer_addr, "inbound session failed: {e}");
                }
            });
        }
    }

    /// One inbound session: verify the handshake, then mirror the exchange.
    async fn handle_inbound(&self, stream: TcpStream) -> SyncResult<()> {
        let peer_addr = stream.peer_addr()?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let request: HandshakeRequest = wire::read_message(&mut reader, READ_TIMEOUT).await?;
        if !request.is_valid() {
            let reply = HandshakeReply::error("unexpected message type");
            wire::write_message(&mut write_half, &reply, READ_TIMEOUT).await?;
            return Err(SyncError::Protocol("missing handshake".into()));
        }
        let Some(peer) = self.registry.get(request.device_id) else {
            let reply = HandshakeReply::error("device not paired");
            wire::write_message(&mut write_half, &reply, READ_TIMEOUT).await?;
            return Err(SyncError::Handshake("unpaired device".into()));
        };
        if request.account_name != self.config.account_name {
            let reply = HandshakeReply::error("account mismatch");
            wire::write_message(&mut write_half, &reply, READ_TIMEOUT).await?;
            return Err(SyncError::Handshake("account mismatch".into()));
        }

        // Inbound sessions share the single-flight guard with outbound
        // cycles; a busy initiator simply retries later.
        let guard = match BusyGuard::acquire(self) {
            Ok(guard) => guard,
            Err(_) => {
                let reply = HandshakeReply::error("sync already in progress");
                wire::write_message(&mut write_half, &reply, READ_TIMEOUT).await?;
                return Err(SyncError::AlreadyInProgress);
            }
        };
        if self.vault.lock().unwrap().is_none() {
            let reply = HandshakeReply::error("no vault loaded");
            wire::write_message(&mut write_half, &reply, READ_TIMEOUT).await?;
            guard.finish(SessionState::Idle);
            return Err(SyncError::NoVaultLoaded);
        }
        self.state.send_replace(SessionState::Syncing);
        wire::write_message(&mut write_half, &HandshakeReply::ok(), READ_TIMEOUT).await?;

        let result = self.exchange_inbound(&mut reader, &mut write_half, &peer).await;
        match &result {
            Ok(summary) => {
                self.record_success(&peer, summary);
                guard.finish(SessionState::Idle);
            }
            Err(e) => {
                self.record_failure(&peer, e);
                guard.finish(SessionState::Error);
            }
        }
        info!(peer = %peer.name, %peer_addr, "inbound session finished");
        result.map(|_| ())
    }

    async fn exchange_inbound<R, W>(
        &self,
        reader: &mut BufReader<R>,
        writer: &mut W,
        peer: &PairedDevice,
    ) -> SyncResult<AppliedSummary>
    where
        R: tokio::io::AsyncRead + Unpin,
        W: tokio::io::AsyncWrite + Unpin,
    {
        // The initiator sends its set first; we answer with ours.
        let remote: EntrySetMessage = wire::read_message(reader, READ_TIMEOUT).await?;
        let local = self.with_vault(|v| Ok(v.list_entries()?))?;
        wire::write_message(writer, &EntrySetMessage { entries: local.clone() }, READ_TIMEOUT)
            .await?;

        let plan = self.engine.diff(&local, &remote.entries, &peer.name);
        let summary = self.with_vault(|v| self.engine.apply(v, &plan.local_changes, &peer.name))?;
        self.registry.mark_synced(peer.id)?;
        Ok(summary)
    }

    /// Reacts to network transitions and the background timer.
    async fn run_triggers(self: Arc<Self>, cancel: CancellationToken) {
        let mut transitions = self.trust.subscribe();
        let mut ticker = tokio::time::interval(self.config.periodic_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Swallow the immediate first tick.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("trigger loop stopped");
                    return;
                }
                transition = transitions.recv() => {
                    match transition {
                        Ok(t) if t.joined() => {
                            self.on_network_joined(&mut transitions).await;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
                _ = ticker.tick() => {
                    if self.background_sync() && self.auto_sync()
                        && !self.paused.load(Ordering::SeqCst)
                    {
                        if let Err(e) = self.run_cycle(SyncTrigger::Periodic).await {
                            debug!("periodic sync skipped: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Debounced reaction to landing on a network: let the stack settle,
    /// drop transitions that arrived meanwhile, then sync if the network we
    /// settled on is trusted.
    async fn on_network_joined(
        &self,
        transitions: &mut broadcast::Receiver<crate::trust::TrustTransition>,
    ) {
        if self.paused.load(Ordering::SeqCst) || !self.auto_sync() {
            return;
        }
        tokio::time::sleep(self.config.trigger_debounce).await;
        while transitions.try_recv().is_ok() {}
        if !self.trust.is_trusted() {
            debug!("settled on an untrusted network, not syncing");
            return;
        }
        if let Err(e) = self.run_cycle(SyncTrigger::NetworkJoined).await {
            debug!("network-join sync skipped: {e}");
        }
    }

    fn auto_sync(&self) -> bool {
        keys::auto_sync_enabled(self.settings.as_ref()).unwrap_or(true)
    }

    fn background_sync(&self) -> bool {
        keys::background_sync_enabled(self.settings.as_ref()).unwrap_or(false)
    }

    fn record_success(&self, peer: &PairedDevice, summary: &AppliedSummary) {
        let _ = self.events.send(SyncEvent::PeerSynced {
            peer_name: peer.name.clone(),
            added: summary.added,
            modified: summary.modified,
            deleted: summary.deleted,
        });
        let entry = SyncLogEntry::success(
            peer.id,
            &peer.name,
            &self.config.account_name,
            summary.items.clone(),
        );
        if let Err(e) = self.log.append(entry) {
            warn!("sync log append failed: {e}");
        }
    }

    fn record_failure(&self, peer: &PairedDevice, error: &SyncError) {
        let _ = self.events.send(SyncEvent::PeerFailed {
            peer_name: peer.name.clone(),
            error: error.to_string(),
        });
        let entry = SyncLogEntry::failure(
            peer.id,
            &peer.name,
            &self.config.account_name,
            error.to_string(),
        );
        if let Err(e) = self.log.append(entry) {
            warn!("sync log append failed: {e}");
        }
    }
}

/// Single-flight guard: exactly one session at a time, outbound or inbound.
struct BusyGuard<'a> {
    orchestrator: &'a SyncOrchestrator,
    finished: bool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(orchestrator: &'a SyncOrchestrator) -> SyncResult<Self> {
        if orchestrator.busy.swap(true, Ordering::SeqCst) {
            return Err(SyncError::AlreadyInProgress);
        }
        Ok(Self {
            orchestrator,
            finished: false,
        })
    }

    fn finish(mut self, state: SessionState) {
        let state = if self.orchestrator.paused.load(Ordering::SeqCst) {
            SessionState::Paused
        } else {
            state
        };
        self.orchestrator.state.send_replace(state);
        self.finished = true;
        self.orchestrator.busy.store(false, Ordering::SeqCst);
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.orchestrator.state.send_replace(SessionState::Idle);
            self.orchestrator.busy.store(false, Ordering::SeqCst);
        }
    }
}

/// Races a step against cancellation.
async fn with_cancel<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = SyncResult<T>>,
) -> SyncResult<T> {
    tokio::select! {
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = fut => result,
    }
}
