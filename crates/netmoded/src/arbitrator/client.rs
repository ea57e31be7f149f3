//! Client (station) connection attempts.

use super::context::{FlowGuard, GuardKind, Mode};
use super::decision::{FallbackConditions, FallbackDecision};
use super::hotspot::HotspotStart;
use super::{Arbitrator, Settlement};
use crate::auth::{AuthFailure, AuthOutcome};
use crate::capabilities::AdapterCapabilities;
use crate::inspector::NotReadyReason;
use crate::platform::{usable_addresses, SupplicantCommand};
use std::fmt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Failure before the authentication monitor reached a terminal outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreAuthFailure {
    NotReady(NotReadyReason),
    IdentityChanged { renamed_to: Option<String> },
    SupplicantLaunch(String),
}

impl fmt::Display for PreAuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreAuthFailure::NotReady(reason) => {
                write!(f, "interface validation failed: {}", reason)
            }
            PreAuthFailure::IdentityChanged { renamed_to: Some(name) } => {
                write!(f, "interface identity changed (now {})", name)
            }
            PreAuthFailure::IdentityChanged { renamed_to: None } => {
                f.write_str("interface identity changed")
            }
            PreAuthFailure::SupplicantLaunch(e) => write!(f, "supplicant launch failed: {}", e),
        }
    }
}

#[derive(Debug)]
enum Attempt {
    Connected { ssid: Option<String> },
    /// The attempt proved no connection will come; evaluate fallback
    Failed { cause: String },
    /// Retryable
    PreAuth(PreAuthFailure),
    Stopped,
}

impl Arbitrator {
    /// Client connection with bounded retries
    pub(super) async fn client_flow(&self) -> Settlement {
        let retries = self.inner.timings.client_retries.max(1);

        for attempt in 1..=retries {
            let Some(client) = FlowGuard::acquire(&self.inner.context, GuardKind::ClientStart)
            else {
                debug!("AP start already in progress, ignoring duplicate call");
                return Settlement::offline("client start already in progress");
            };
            {
                let mut ctx = self.inner.context.lock().unwrap_or_else(|e| e.into_inner());
                ctx.mode = Mode::ClientConnecting;
                ctx.retry_count = attempt - 1;
            }

            self.wait_for_release().await;
            let result = self.attempt_client().await;
            drop(client);

            match result {
                Attempt::Connected { ssid } => return self.on_client_connected(ssid).await,
                Attempt::Failed { cause } => {
                    info!("Connection failed. Reason: {}", cause);
                    return self.evaluate_fallback().await;
                }
                Attempt::Stopped => return Settlement::offline("connection attempt stopped"),
                Attempt::PreAuth(failure) => {
                    info!(
                        "startAP failed ({}). Retry {} of {}",
                        failure, attempt, retries
                    );
                    if attempt < retries {
                        tokio::time::sleep(self.inner.timings.client_retry_delay).await;
                    }
                }
            }
        }

        info!("startAP reached max retries. Attempting fallback.");
        self.verified_hotspot(HotspotStart::Normal).await
    }

    /// Wait (bounded) for the interface to drop its link; proceed regardless
    async fn wait_for_release(&self) {
        let timings = &self.inner.timings;
        if self
            .inner
            .inspector
            .wait_until_released(self.wlan(), timings.release_wait, timings.release_step)
            .await
        {
            debug!("Interface {} released. Proceeding with startAP...", self.wlan());
        } else {
            debug!(
                "Timeout waiting for {} release. Proceeding with startAP anyway...",
                self.wlan()
            );
        }
    }

    async fn attempt_client(&self) -> Attempt {
        let platform = &self.inner.platform;
        let inspector = &self.inner.inspector;
        let timings = &self.inner.timings;
        let wlan = self.wlan();

        // a. clean slate, scoped to this interface
        if let Err(e) = platform.deconfigure(wlan).await {
            debug!("ifdeconfig: {}", e);
        }
        self.stop_station().await;

        // b. let pending renames finish before binding anything
        let settle_started = Instant::now();
        match platform.udev_settle(timings.udev_settle).await {
            Ok(()) => debug!(
                "UdevCoordinator: udev settled in {}ms",
                settle_started.elapsed().as_millis()
            ),
            Err(e) => info!("UdevCoordinator: udev settle timeout or error: {}", e),
        }

        // c. readiness
        let mut validation = inspector.validate_ready(wlan);
        if !validation.ready {
            info!(
                "STAGE 1 VALIDATION FAILED: {} not ready - reason: {}",
                wlan,
                validation.reason_str()
            );
            match inspector.wait_until_ready(wlan, timings.readiness_wait).await {
                Ok(ready) => {
                    info!("STAGE 1: {} became ready after waiting", wlan);
                    validation = ready;
                }
                Err(timeout) => {
                    info!("ERROR: {} failed to become ready, cannot start WiFi client mode", wlan);
                    let reason = timeout
                        .last
                        .reason
                        .unwrap_or(NotReadyReason::DriverNotReady);
                    return Attempt::PreAuth(PreAuthFailure::NotReady(reason));
                }
            }
        } else {
            info!(
                "STAGE 1: {} validated and ready (MAC: {}, USB: {})",
                wlan,
                validation.mac.as_deref().unwrap_or("?"),
                validation.is_usb
            );
        }
        let Some(initial_mac) = validation.mac.clone() else {
            return Attempt::PreAuth(PreAuthFailure::NotReady(NotReadyReason::InterfaceNotFound));
        };

        // d. supplicant, then identity strictly before any further command
        let launched = platform.start_supplicant(wlan).await;
        if !inspector.verify_identity(wlan, &initial_mac) {
            info!("CRITICAL: {} identity changed during wpa_supplicant launch!", wlan);
            info!(
                "This indicates udev rename race condition - \
                 wpa_supplicant may be bound to wrong device"
            );
            let renamed_to = inspector.detect_rename(wlan, &initial_mac);
            if let Some(name) = &renamed_to {
                info!("Original {} is now named {}", wlan, name);
            }
            return Attempt::PreAuth(PreAuthFailure::IdentityChanged { renamed_to });
        }
        if let Err(e) = launched {
            info!("wpa_supplicant launch failed: {}", e);
            return Attempt::PreAuth(PreAuthFailure::SupplicantLaunch(e.to_string()));
        }

        // e. link up and kick the supplicant out of a boot-time inert state
        match platform.link_up(wlan).await {
            Ok(()) => debug!("Brought {} interface up", wlan),
            Err(e) => debug!("Could not bring interface up: {}", e),
        }
        tokio::time::sleep(timings.link_stabilize).await;
        match platform
            .supplicant_command(wlan, SupplicantCommand::Reconfigure)
            .await
        {
            Ok(()) => debug!("Triggered wpa_cli reconfigure"),
            Err(e) => debug!("Could not trigger reconfigure: {}", e),
        }

        // f. authentication
        info!("STAGE 2: Starting event-driven WPA state monitor");
        match self.inner.auth.monitor(wlan).await {
            AuthOutcome::Connected { ssid } => {
                info!("STAGE 2: Connection successful - Connected to {}", ssid);
                self.acquire_address(validation.is_usb).await;
                self.spawn_ready_notification();
                // g. confirmation
                self.poll_for_address().await
            }
            AuthOutcome::Failed { failure, detail } => {
                info!("STAGE 2: Connection failed - {}", failure.explanation());
                info!("STAGE 2: Failure details: {}", detail);
                if let Some(session) = self.inner.auth.last_session() {
                    debug!(
                        "STAGE 2: Last state {} after {} consecutive failures",
                        session
                            .current
                            .as_ref()
                            .map(|s| s.as_str())
                            .unwrap_or("NULL"),
                        session.consecutive_failures
                    );
                }
                if failure == AuthFailure::InterfaceDisabled
                    && !inspector.verify_identity(wlan, &initial_mac)
                {
                    info!("STAGE 2: Interface identity changed - rename race detected");
                }
                info!(
                    "STAGE 2: Skipping address polling, \
                     proceeding directly to hotspot evaluation"
                );
                self.spawn_ready_notification();
                Attempt::Failed {
                    cause: failure.code().to_string(),
                }
            }
            AuthOutcome::Stopped => Attempt::Stopped,
        }
    }

    /// USB adapters restart the DHCP service; onboard ones launch a client
    async fn acquire_address(&self, is_usb: bool) {
        let platform = &self.inner.platform;
        let timings = &self.inner.timings;
        let wlan = self.wlan();

        if is_usb {
            self.log_usb_capabilities().await;
            info!("Restarting dhcpcd.service for reliable DHCP");
            if let Err(e) = platform.restart_dhcp_service().await {
                warn!("Failed to restart dhcpcd.service: {}", e);
            }
            tokio::time::sleep(timings.dhcp_settle).await;
        } else {
            info!("Onboard WiFi adapter detected, using standard dhcpcd flow");
            tokio::time::sleep(timings.dhcp_launch_delay).await;
            if let Err(e) = platform.start_dhcp_client(wlan).await {
                warn!("Could not launch DHCP client: {}", e);
            }
            tokio::time::sleep(timings.dhcp_settle).await;
            if platform.dhcp_client_running(wlan).await {
                debug!("dhcpcd process running for {}", wlan);
            } else {
                info!("Warning: dhcpcd may not be managing {}", wlan);
            }
        }
    }

    /// Capabilities are queried once per process, on the first USB connection
    async fn log_usb_capabilities(&self) {
        let known = self
            .inner
            .usb_capabilities
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some();
        if known {
            return;
        }

        let report = match self.inner.platform.wiphy_info().await {
            Ok(report) => report,
            Err(e) => {
                info!("Could not query USB capabilities: {}", e);
                String::new()
            }
        };
        let chipset = self.inner.inspector.device_name(self.wlan());
        let caps = AdapterCapabilities::parse(&report, chipset);
        caps.log();
        *self
            .inner
            .usb_capabilities
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(caps);
    }

    /// Poll for a usable address until the connection timeout
    async fn poll_for_address(&self) -> Attempt {
        let platform = &self.inner.platform;
        let timings = &self.inner.timings;
        let wlan = self.wlan();

        let deadline = Instant::now() + timings.connection_timeout;
        let mut ticker =
            tokio::time::interval_at(Instant::now() + timings.address_poll, timings.address_poll);

        loop {
            ticker.tick().await;
            if Instant::now() > deadline {
                break;
            }
            info!("trying...");

            if !platform.supplicant_running(wlan).await {
                info!("ERROR: wpa_supplicant process not found, connection impossible");
                return Attempt::Failed {
                    cause: "wpa_supplicant process not running".to_string(),
                };
            }

            let ssid = platform.current_ssid(wlan).await;
            let addrs = match platform.addresses(wlan).await {
                Ok(addrs) => addrs,
                Err(e) => {
                    debug!("address query failed: {}", e);
                    continue;
                }
            };
            let usable = usable_addresses(&addrs);
            info!("... {} addresses: {:?}", wlan, usable);

            if !usable.is_empty() {
                return Attempt::Connected { ssid };
            }
        }

        let cause = match platform.current_ssid(wlan).await {
            Some(_) => "SSID associated but no IP address received from DHCP",
            None => "wpa_supplicant failed to associate with AP",
        };
        info!("Overtime, connection failed.");
        Attempt::Failed {
            cause: cause.to_string(),
        }
    }

    async fn on_client_connected(&self, ssid: Option<String>) -> Settlement {
        match &ssid {
            Some(ssid) => {
                info!("Connected to SSID: {}", ssid);
                if let Some(configured) = self.inner.config.configured_network_name() {
                    if &configured != ssid {
                        warn!("Connected to wrong SSID. Expected: {}", configured);
                    }
                }
            }
            None => {
                info!("Connected (SSID unavailable but IP assigned - driver compatibility issue)")
            }
        }
        info!("It's done! AP");

        if let Err(e) = self.inner.markers.record_connected() {
            warn!("Could not record first connection: {}", e);
        }
        {
            let mut ctx = self.inner.context.lock().unwrap_or_else(|e| e.into_inner());
            ctx.retry_count = 0;
            ctx.first_boot_established = true;
        }
        self.restart_mdns().await;
        Settlement::ClientConnected { ssid }
    }

    /// Hotspot or offline after a classified client failure
    pub(super) async fn evaluate_fallback(&self) -> Settlement {
        info!("Evaluating hotspot condition.");
        let conf = self.inner.config.load();
        let conditions = FallbackConditions {
            fallback_enabled: conf.hotspot_fallback(),
            ssid_visible: self.configured_network_visible(conf.network_name()).await,
            ever_connected: self.snapshot().first_boot_established,
            wireless_enabled: conf.wireless_enabled(),
            wired_active: self.wired_active(),
        };
        let decision = FallbackDecision::evaluate(&conditions);
        debug!("Fallback conditions {:?} -> {:?}", conditions, decision);

        match decision {
            FallbackDecision::Hotspot => self.fallback_hotspot().await,
            FallbackDecision::EmergencyHotspot => {
                info!("=== EMERGENCY RECOVERY MODE ===");
                info!("No network connectivity: Ethernet DOWN, WiFi connection FAILED");
                info!("Forcing hotspot for system recovery (overriding config settings)");
                info!("===============================");
                self.verified_hotspot(HotspotStart::Forced).await
            }
            FallbackDecision::Offline => {
                info!("WiFi connection failed, but system accessible via ethernet");
                Settlement::offline("WiFi failed, reachable via ethernet")
            }
        }
    }

    async fn configured_network_visible(&self, name: Option<String>) -> bool {
        let Some(name) = name else {
            return false;
        };
        match self.inner.platform.scan_ssids(self.wlan()).await {
            Ok(ssids) => ssids.iter().any(|s| s == &name),
            Err(e) => {
                debug!("Scan for {} failed: {}", name, e);
                false
            }
        }
    }
}
