//! Pairing exchanges over loopback TCP.

use chrono::{Duration, Utc};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vaultlink_sync::{
    DeviceRegistry, PairingError, PairingPayload, PairingService, PairingState, SyncError,
};
use vaultlink_types::{DeviceId, DeviceIdentity};
use vaultlink_vault::MemorySettings;

fn service(name: &str) -> (PairingService, Arc<DeviceRegistry>) {
    let registry =
        Arc::new(DeviceRegistry::new(Arc::new(MemorySettings::new())).unwrap());
    let identity = DeviceIdentity::new(name);
    (PairingService::new(identity, registry.clone()), registry)
}

/// Points the payload at loopback so the responder connects to the
/// initiator's listener regardless of the host's interface setup.
fn via_loopback(payload: &PairingPayload) -> PairingPayload {
    let mut p = payload.clone();
    p.ip_address = IpAddr::V4(Ipv4Addr::LOCALHOST);
    p
}

#[tokio::test]
async fn full_exchange_pairs_both_sides() {
    let (alice, alice_registry) = service("alice-phone");
    let (bob, bob_registry) = service("bob-laptop");
    let cancel = CancellationToken::new();

    let pending = alice.begin().await.unwrap();
    assert_eq!(alice.state(), PairingState::AwaitingPeer);
    let payload = via_loopback(pending.payload());
    let alice_id = payload.device_id;

    let (initiator, responder) =
        tokio::join!(pending.await_peer(&cancel), bob.respond(&payload, &cancel));

    let bob_seen_by_alice = initiator.unwrap();
    let alice_seen_by_bob = responder.unwrap();

    assert_eq!(bob_seen_by_alice.name, "bob-laptop");
    assert_eq!(alice_seen_by_bob.name, "alice-phone");
    assert_eq!(alice_seen_by_bob.id, alice_id);
    assert!(alice_registry.is_paired(bob_seen_by_alice.id));
    assert!(bob_registry.is_paired(alice_id));
    assert_eq!(alice.state(), PairingState::Completed);
    assert_eq!(bob.state(), PairingState::Completed);

    alice.reset();
    assert_eq!(alice.state(), PairingState::Idle);
}

#[tokio::test]
async fn expired_payload_is_rejected_before_connecting() {
    let (bob, _) = service("bob-laptop");
    let payload = PairingPayload {
        device_id: DeviceId::new(),
        device_name: "alice-phone".into(),
        public_key: "pk".into(),
        ip_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 1,
        generated_at: Utc::now() - Duration::minutes(6),
        pairing_token: "deadbeef".into(),
    };

    let err = bob
        .respond(&payload, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Pairing(PairingError::Expired)));
    assert_eq!(bob.state(), PairingState::Failed);
}

#[tokio::test]
async fn a_token_is_honored_at_most_once() {
    let (bob, _) = service("bob-laptop");
    let cancel = CancellationToken::new();
    // Nobody listens on this port; the first attempt consumes the token and
    // fails to connect, the second is refused outright.
    let payload = PairingPayload {
        device_id: DeviceId::new(),
        device_name: "alice-phone".into(),
        public_key: "pk".into(),
        ip_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 1,
        generated_at: Utc::now(),
        pairing_token: "cafebabe".into(),
    };

    let first = bob.respond(&payload, &cancel).await.unwrap_err();
    assert!(matches!(
        first,
        SyncError::Pairing(PairingError::Unreachable(_))
    ));

    let second = bob.respond(&payload, &cancel).await.unwrap_err();
    assert!(matches!(
        second,
        SyncError::Pairing(PairingError::TokenConsumed)
    ));
}

#[tokio::test]
async fn tampered_token_fails_both_sides() {
    let (alice, alice_registry) = service("alice-phone");
    let (bob, _) = service("bob-laptop");
    let cancel = CancellationToken::new();

    let pending = alice.begin().await.unwrap();
    let mut payload = via_loopback(pending.payload());
    payload.pairing_token = "0000000000000000".into();

    let (initiator, responder) =
        tokio::join!(pending.await_peer(&cancel), bob.respond(&payload, &cancel));

    assert!(matches!(
        initiator.unwrap_err(),
        SyncError::Pairing(PairingError::TokenMismatch)
    ));
    assert!(matches!(
        responder.unwrap_err(),
        SyncError::Pairing(PairingError::Rejected)
    ));
    assert!(alice_registry.is_empty());
    assert_eq!(alice.state(), PairingState::Failed);
}

#[tokio::test]
async fn only_one_attempt_runs_at_a_time() {
    let (alice, _) = service("alice-phone");

    let pending = alice.begin().await.unwrap();
    let err = alice.begin().await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Pairing(PairingError::AlreadyInProgress)
    ));

    // Abandoning the pending attempt frees the slot.
    drop(pending);
    assert_eq!(alice.state(), PairingState::Idle);
    let _pending = alice.begin().await.unwrap();
}

#[tokio::test]
async fn cancellation_aborts_the_wait() {
    let (alice, _) = service("alice-phone");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let pending = alice.begin().await.unwrap();
    let err = pending.await_peer(&cancel).await.unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));
    assert_eq!(alice.state(), PairingState::Idle);
}

#[tokio::test]
async fn cancelled_responder_returns_to_idle() {
    let (alice, _) = service("alice-phone");
    let (bob, _) = service("bob-laptop");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let pending = alice.begin().await.unwrap();
    let payload = via_loopback(pending.payload());

    let err = bob.respond(&payload, &cancel).await.unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));
    assert_eq!(bob.state(), PairingState::Idle);
}

#[tokio::test]
async fn pending_attempt_debug_never_leaks_the_token() {
    let (alice, _) = service("alice-phone");
    let pending = alice.begin().await.unwrap();
    let token = pending.payload().pairing_token.clone();

    let rendered = format!("{pending:?}");
    assert!(!rendered.contains(&token));
    assert!(rendered.contains("<redacted>"));
}

#[test]
fn payload_debug_never_leaks_the_token() {
    let payload = PairingPayload {
        device_id: DeviceId::new(),
        device_name: "alice-phone".into(),
        public_key: "pk".into(),
        ip_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 4242,
        generated_at: Utc::now(),
        pairing_token: "super-secret-token".into(),
    };
    let rendered = format!("{payload:?}");
    assert!(!rendered.contains("super-secret-token"));
    assert!(rendered.contains("<redacted>"));
}
