//! Lightweight WiFi reconnect after ethernet goes away.
//!
//! Reuses the running supplicant instead of a full flow. Anything short of
//! a completed association falls back to a full `run`.

use super::context::{FlowGuard, GuardKind};
use super::{Arbitrator, Settlement};
use crate::auth::SupplicantState;
use crate::platform::parse::status_field;
use crate::platform::SupplicantCommand;
use tracing::{debug, info, warn};

impl Arbitrator {
    /// Returns None when dropped because another flow is active
    pub async fn reconnect(&self) -> Option<Settlement> {
        let flow = FlowGuard::acquire(&self.inner.context, GuardKind::Flow);
        let Some(flow) = flow else {
            debug!("Wireless flow already in progress, ignoring reconnect");
            return None;
        };
        let Some(client) = FlowGuard::acquire(&self.inner.context, GuardKind::ClientStart) else {
            debug!("AP start already in progress, ignoring reconnect");
            return None;
        };

        info!("SNM: Ethernet disconnected, reconnecting WiFi");
        if let Some(settlement) = self.try_reconnect().await {
            self.settle(&settlement);
            return Some(settlement);
        }

        drop(client);
        drop(flow);
        self.run().await
    }

    async fn try_reconnect(&self) -> Option<Settlement> {
        let platform = &self.inner.platform;
        let timings = &self.inner.timings;
        let wlan = self.wlan();

        if !platform.supplicant_running(wlan).await {
            info!("reconnectWiFi: wpa_supplicant not running, starting full wireless flow");
            return None;
        }

        if let Err(e) = platform
            .supplicant_command(wlan, SupplicantCommand::Reconnect)
            .await
        {
            info!("reconnectWiFi: Reconnect command failed: {}", e);
            info!("reconnectWiFi: Falling back to full wireless flow restart");
            return None;
        }
        info!("reconnectWiFi: WiFi reconnection triggered");

        tokio::time::sleep(timings.reconnect_window).await;

        let status = match platform.supplicant_status(wlan).await {
            Ok(status) => status,
            Err(e) => {
                info!("reconnectWiFi: Could not verify WiFi state: {}", e);
                info!("reconnectWiFi: Falling back to full wireless flow");
                return None;
            }
        };
        let state = SupplicantState::from_status(&status);
        debug!("reconnectWiFi: WiFi state after reconnect: {:?}", state);
        if state != Some(SupplicantState::Completed) {
            info!(
                "reconnectWiFi: WiFi reconnect incomplete ({}), reinitializing wireless flow",
                state.map(|s| s.to_string()).unwrap_or_else(|| "unknown".to_string())
            );
            return None;
        }
        info!("reconnectWiFi: WiFi reconnected successfully");

        let is_usb = self
            .inner
            .inspector
            .descriptor(wlan)
            .map(|d| d.is_usb)
            .unwrap_or(false);
        if is_usb {
            // A fresh lease avoids rebinding one that expired meanwhile
            info!("reconnectWiFi: USB adapter detected, requesting fresh DHCP lease");
            if let Err(e) = platform.request_fresh_lease(wlan).await {
                warn!("reconnectWiFi: Failed to request fresh DHCP: {}", e);
            }
            tokio::time::sleep(timings.dhcp_settle).await;
        } else if let Err(e) = platform.start_dhcp_client(wlan).await {
            warn!("reconnectWiFi: Could not launch DHCP client: {}", e);
        }

        let elapsed = self
            .inner
            .context
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take_transition_elapsed();
        if let Some(ms) = elapsed {
            info!("SNM: WiFi reconnection completed in {}ms", ms);
        }

        self.restart_mdns().await;
        Some(Settlement::ClientConnected {
            ssid: status_field(&status, "ssid").map(str::to_string),
        })
    }
}
