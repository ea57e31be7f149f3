//! Ethernet Watcher Tests
//!
//! Wired carrier transitions and the follow-up they schedule on the
//! Arbitrator. Most tests call `check` directly on the paused clock; one
//! test goes through real filesystem notifications.

mod common;

use common::{drain, FakePlatform, Fixture};
use netmode_common::{NetworkDecision, WiredStatus};
use netmoded::{EthernetWatcher, Settlement, TransitionAction};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_startup_reading_seeds_state() {
    let fx = Fixture::new();
    fx.set_carrier("eth0", true);
    let platform = FakePlatform::new(&fx);
    let arb = fx.arbitrator(platform.clone(), true);
    let watcher = EthernetWatcher::new(arb.clone());

    let transition = watcher.check(true).await.unwrap();

    assert_eq!(transition.from, WiredStatus::Disconnected);
    assert_eq!(transition.to, WiredStatus::Connected);
    // No follow-up on the startup reading: the initial run handles it
    assert_eq!(transition.action, TransitionAction::None);
    assert!(arb.snapshot().wired_active);
    assert_eq!(arb.publisher().read_wired_status(), Some(WiredStatus::Connected));
    assert_eq!(platform.count("release_dhcp_lease"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_carrier_is_ignored() {
    let fx = Fixture::new();
    let platform = FakePlatform::new(&fx);
    let arb = fx.arbitrator(platform.clone(), true);
    let watcher = EthernetWatcher::new(arb.clone());

    assert_eq!(watcher.check(true).await, None);
    // The watcher's own cache write comes back as an event
    assert_eq!(watcher.check(false).await, None);
    assert_eq!(watcher.check(false).await, None);
    assert!(arb.snapshot().transition_started.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_transitions_without_single_network_mode() {
    let fx = Fixture::new();
    let platform = FakePlatform::new(&fx);
    let arb = fx.arbitrator(platform.clone(), false);
    let watcher = EthernetWatcher::new(arb.clone());
    watcher.check(true).await;

    fx.set_carrier("eth0", true);
    let up = watcher.check(false).await.unwrap();
    fx.set_carrier("eth0", false);
    let down = watcher.check(false).await.unwrap();

    assert_eq!(up.action, TransitionAction::None);
    assert_eq!(down.action, TransitionAction::None);
    assert!(!arb.snapshot().wired_active);
    assert_eq!(arb.publisher().read_wired_status(), Some(WiredStatus::Disconnected));
    drain(Duration::from_secs(30)).await;
    assert_eq!(platform.count("udev_settle"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_ethernet_up_switches_to_scan_mode() {
    let fx = Fixture::new();
    let platform = FakePlatform::new(&fx);
    platform.script_success("Home", "192.168.1.50");
    let arb = fx.arbitrator(platform.clone(), true);
    let watcher = EthernetWatcher::new(arb.clone());
    watcher.check(true).await;
    arb.run().await;
    assert_eq!(arb.publisher().read_decision(), Some(NetworkDecision::Ap));

    fx.set_carrier("eth0", true);
    let transition = watcher.check(false).await.unwrap();
    assert_eq!(transition.action, TransitionAction::Rearbitrate);
    assert_eq!(platform.count("release_dhcp_lease"), 1);

    drain(Duration::from_secs(30)).await;

    assert_eq!(arb.publisher().read_decision(), Some(NetworkDecision::Offline));
    assert!(arb.publisher().last().unwrap().scan_mode);
    assert_eq!(fx.read(&fx.paths.snm_status).as_deref(), Some("scan_mode"));
    assert!(platform.with(|s| s.supplicant_idle));
}

#[tokio::test(start_paused = true)]
async fn test_ethernet_down_with_live_association_does_nothing() {
    let fx = Fixture::new();
    fx.set_carrier("eth0", true);
    let platform = FakePlatform::new(&fx);
    platform.with(|s| {
        s.supplicant_running = true;
        s.associated_ssid = Some("Home".to_string());
    });
    platform.script(&[(0.0, "COMPLETED")]);
    let arb = fx.arbitrator(platform.clone(), true);
    let watcher = EthernetWatcher::new(arb.clone());
    watcher.check(true).await;

    fx.set_carrier("eth0", false);
    let transition = watcher.check(false).await.unwrap();

    assert_eq!(transition.action, TransitionAction::AlreadyConnected);
    drain(Duration::from_secs(30)).await;
    assert_eq!(platform.count("supplicant_command:reconnect"), 0);
    assert_eq!(platform.count("udev_settle"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_ethernet_down_reconnects_wifi() {
    let fx = Fixture::new();
    fx.set_carrier("eth0", true);
    let platform = FakePlatform::new(&fx);
    let arb = fx.arbitrator(platform.clone(), true);
    let watcher = EthernetWatcher::new(arb.clone());
    watcher.check(true).await;
    assert_eq!(arb.run().await, Some(Settlement::ScanMode));

    platform.with(|s| {
        s.associated_ssid = Some("Home".to_string());
        s.dhcp_addresses = vec!["192.168.1.50".parse().unwrap()];
    });
    fx.set_carrier("eth0", false);
    let transition = watcher.check(false).await.unwrap();
    assert_eq!(transition.action, TransitionAction::Reconnect);

    drain(Duration::from_secs(10)).await;

    assert_eq!(platform.count("supplicant_command:reconnect"), 1);
    assert_eq!(platform.count("start_dhcp_client"), 1);
    // Lightweight path: no new attempt
    assert_eq!(platform.count("udev_settle"), 0);
    assert_eq!(arb.publisher().read_decision(), Some(NetworkDecision::Ap));
    assert!(!fx.paths.snm_status.exists());

    let reconnect = platform.times("supplicant_command:reconnect")[0];
    let status = platform
        .times("supplicant_status")
        .into_iter()
        .find(|t| *t > reconnect)
        .unwrap();
    assert_eq!(status - reconnect, arb.timings().reconnect_window);
}

#[tokio::test(start_paused = true)]
async fn test_usb_reconnect_requests_fresh_lease() {
    let fx = Fixture::with_wlan(true);
    fx.set_carrier("eth0", true);
    let platform = FakePlatform::new(&fx);
    let arb = fx.arbitrator(platform.clone(), true);
    let watcher = EthernetWatcher::new(arb.clone());
    watcher.check(true).await;
    arb.run().await;

    platform.with(|s| s.dhcp_addresses = vec!["10.0.0.7".parse().unwrap()]);
    fx.set_carrier("eth0", false);
    watcher.check(false).await;
    drain(Duration::from_secs(10)).await;

    assert_eq!(platform.count("request_fresh_lease"), 1);
    assert_eq!(platform.count("start_dhcp_client"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_incomplete_reconnect_falls_back_to_full_run() {
    let fx = Fixture::new();
    fx.set_carrier("eth0", true);
    let platform = FakePlatform::new(&fx);
    let arb = fx.arbitrator(platform.clone(), true);
    let watcher = EthernetWatcher::new(arb.clone());
    watcher.check(true).await;
    arb.run().await;

    platform.with(|s| s.reconnect_state = "SCANNING".to_string());
    fx.set_carrier("eth0", false);
    watcher.check(false).await;
    drain(Duration::from_secs(120)).await;

    assert_eq!(platform.count("supplicant_command:reconnect"), 1);
    assert_eq!(platform.count("udev_settle"), 1, "full client attempt expected");
    // Stuck scanning with no configured network: hotspot
    assert_eq!(arb.publisher().read_decision(), Some(NetworkDecision::Hotspot));
    let ctx = arb.snapshot();
    assert!(!ctx.flow_in_progress);
    assert!(!ctx.ap_start_in_progress);
}

/// Real filesystem notifications, real clock
#[tokio::test]
async fn test_status_file_change_triggers_check() {
    let fx = Fixture::new();
    let platform = FakePlatform::new(&fx);
    let arb = fx.arbitrator(platform.clone(), false);
    let watcher = EthernetWatcher::new(arb.clone());

    let handle = watcher.start().await.unwrap();
    assert_eq!(arb.publisher().read_wired_status(), Some(WiredStatus::Disconnected));
    assert!(!arb.snapshot().wired_active);

    fx.set_carrier("eth0", true);
    std::fs::write(&fx.paths.eth_status, "disconnected").unwrap();

    let mut seen = false;
    for _ in 0..100 {
        if arb.snapshot().wired_active {
            seen = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    handle.abort();

    assert!(seen, "carrier change not picked up");
    assert_eq!(arb.publisher().read_wired_status(), Some(WiredStatus::Connected));
}
