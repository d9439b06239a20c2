//! Trust monitor gating and persistence.

use std::sync::Arc;
use vaultlink_sync::{FixedNetworkSource, TrustMonitor, TrustState};
use vaultlink_vault::{MemorySettings, SettingsStore};

fn monitor_on(
    network: Option<&str>,
) -> (Arc<FixedNetworkSource>, Arc<dyn SettingsStore>, TrustMonitor) {
    let source = Arc::new(match network {
        Some(ssid) => FixedNetworkSource::on_network(ssid),
        None => FixedNetworkSource::new(),
    });
    let settings: Arc<dyn SettingsStore> = Arc::new(MemorySettings::new());
    let monitor = TrustMonitor::new(source.clone(), settings.clone()).unwrap();
    (source, settings, monitor)
}

#[test]
fn unreadable_network_identity_is_unavailable_not_untrusted() {
    let (_, _, monitor) = monitor_on(None);
    assert_eq!(monitor.state(), TrustState::Unavailable);
    assert!(!monitor.is_trusted());
}

#[test]
fn unknown_network_is_untrusted_until_allow_listed() {
    let (_, _, monitor) = monitor_on(Some("home-wifi"));
    assert_eq!(monitor.state(), TrustState::Untrusted);

    monitor.add_trusted("home-wifi").unwrap();
    assert_eq!(monitor.state(), TrustState::Trusted);
    assert!(monitor.is_trusted());

    monitor.remove_trusted("home-wifi").unwrap();
    assert_eq!(monitor.state(), TrustState::Untrusted);
}

#[test]
fn add_trusted_is_idempotent() {
    let (_, _, monitor) = monitor_on(Some("home-wifi"));
    monitor.add_trusted("home-wifi").unwrap();
    monitor.add_trusted("home-wifi").unwrap();
    assert_eq!(monitor.trusted_networks().len(), 1);
}

#[test]
fn current_network_flag_tracks_the_active_network() {
    let (source, _, monitor) = monitor_on(Some("home-wifi"));
    monitor.add_trusted("home-wifi").unwrap();
    monitor.add_trusted("office-wifi").unwrap();

    let networks = monitor.trusted_networks();
    assert!(networks.iter().find(|n| n.ssid == "home-wifi").unwrap().is_current_network);
    assert!(!networks.iter().find(|n| n.ssid == "office-wifi").unwrap().is_current_network);

    source.set(Some("office-wifi".into()));
    monitor.check_now();
    let networks = monitor.trusted_networks();
    assert!(!networks.iter().find(|n| n.ssid == "home-wifi").unwrap().is_current_network);
    assert!(networks.iter().find(|n| n.ssid == "office-wifi").unwrap().is_current_network);
}

#[test]
fn transitions_report_old_and_new_network() {
    let (source, _, monitor) = monitor_on(Some("home-wifi"));
    let mut events = monitor.subscribe();

    source.set(Some("cafe-wifi".into()));
    let transition = monitor.check_now().unwrap();
    assert_eq!(transition.old.as_deref(), Some("home-wifi"));
    assert_eq!(transition.new.as_deref(), Some("cafe-wifi"));
    assert!(transition.joined());
    assert_eq!(events.try_recv().unwrap(), transition);

    // No change, no event.
    assert!(monitor.check_now().is_none());

    source.set(None);
    let transition = monitor.check_now().unwrap();
    assert_eq!(transition.old.as_deref(), Some("cafe-wifi"));
    assert!(transition.new.is_none());
    assert!(!transition.joined());
}

#[test]
fn allow_list_survives_a_restart() {
    let (source, settings, monitor) = monitor_on(Some("home-wifi"));
    monitor.add_trusted("home-wifi").unwrap();
    drop(monitor);

    let reloaded = TrustMonitor::new(source, settings).unwrap();
    assert_eq!(reloaded.state(), TrustState::Trusted);
}
