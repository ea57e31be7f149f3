//! Single network mode scan state: WiFi up, no address, supplicant idle.

use super::{Arbitrator, Settlement};
use crate::auth::SupplicantState;
use crate::platform::SupplicantCommand;
use std::net::IpAddr;
use tracing::{debug, info, warn};

impl Arbitrator {
    pub(super) async fn enter_scan_mode(&self) -> Settlement {
        if !self.inner.config.wireless_enabled() {
            info!("SNM: WiFi disabled in config, not starting scan mode");
            info!("SNM: Ethernet has exclusive access");
            return Settlement::WirelessDisabled;
        }

        info!("SNM: Maintaining {} UP without IP (scan mode)", self.wlan());
        info!("SNM: Users can configure WiFi via WebUI while ethernet is active");

        let platform = &self.inner.platform;
        let wlan = self.wlan();

        self.stop_station().await;

        if let Err(e) = platform.link_up(wlan).await {
            info!("keepWlanUpWithoutIP: Failed to bring interface UP: {}", e);
            info!("Falling back to interface DOWN");
            return Settlement::offline("scan mode: interface would not come up");
        }
        debug!("keepWlanUpWithoutIP: Interface brought UP");

        if let Err(e) = platform.flush_addresses(wlan).await {
            debug!("keepWlanUpWithoutIP: IP flush error (may be expected): {}", e);
        }

        if let Err(e) = platform.start_supplicant(wlan).await {
            info!("keepWlanUpWithoutIP: wpa_supplicant failed: {}", e);
            info!("Falling back to interface DOWN");
            return Settlement::offline("scan mode: supplicant failed");
        }

        // Keep the supplicant idle: scan capable, never associating
        if let Err(e) = platform
            .supplicant_command(wlan, SupplicantCommand::Disconnect)
            .await
        {
            debug!("keepWlanUpWithoutIP: disconnect command error: {}", e);
        }

        let elapsed = self
            .inner
            .context
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take_transition_elapsed();
        if let Some(ms) = elapsed {
            info!("SNM: Transition to scan mode completed in {}ms", ms);
        }

        info!("SNM: {} is UP without IP, scan capable", wlan);
        self.verify_scan_state().await;
        Settlement::ScanMode
    }

    /// Diagnostic only
    async fn verify_scan_state(&self) {
        let platform = &self.inner.platform;
        let wlan = self.wlan();

        if let Some(link) = self.inner.inspector.oper_state(wlan) {
            debug!(
                "{} verification: state={} CARRIER={}",
                wlan,
                link.oper_state.as_str(),
                link.carrier
            );
        }

        match platform.addresses(wlan).await {
            Ok(addrs) => match addrs.iter().find(|a| matches!(a, IpAddr::V4(_))) {
                Some(addr) => warn!("{} has IP {} but should have none", wlan, addr),
                None => debug!("{} verification: No IP (correct)", wlan),
            },
            Err(e) => debug!("{} verification error: {}", wlan, e),
        }

        match platform.supplicant_status(wlan).await {
            Ok(status) => match SupplicantState::from_status(&status) {
                Some(state) if state.is_idle() => {
                    debug!("{} verification: PASSED - interface ready for scanning", wlan)
                }
                Some(state) => info!(
                    "{} state: {} (expected DISCONNECTED or INACTIVE)",
                    wlan, state
                ),
                None => debug!("{} verification: supplicant state unknown", wlan),
            },
            Err(e) => debug!("{} verification error: {}", wlan, e),
        }
    }
}
