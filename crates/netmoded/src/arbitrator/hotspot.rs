//! Hotspot (access point) starts.

use super::{Arbitrator, Settlement};
use crate::capabilities::supports_concurrent;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum HotspotStart {
    /// Honors the hotspot and wireless enable settings
    Normal,
    /// Support and emergency paths: configuration is ignored
    Forced,
}

#[derive(Debug)]
enum StartResult {
    Started,
    Disabled,
    Failed(String),
}

impl Arbitrator {
    /// Start the access point once, without verification
    pub(super) async fn forced_hotspot(&self) -> Settlement {
        match self.start_hotspot(HotspotStart::Forced).await {
            StartResult::Started => Settlement::Hotspot,
            StartResult::Disabled => Settlement::offline("hotspot disabled"),
            StartResult::Failed(e) => Settlement::offline(format!("forced hotspot failed: {}", e)),
        }
    }

    /// Hotspot after a failed client attempt, sharing the radio if possible
    pub(super) async fn fallback_hotspot(&self) -> Settlement {
        self.prepare_radio_for_hotspot().await;
        match self.start_hotspot(HotspotStart::Normal).await {
            StartResult::Started => Settlement::Hotspot,
            StartResult::Disabled => Settlement::offline("hotspot disabled in configuration"),
            StartResult::Failed(e) => {
                info!("Could not start Hotspot Fallback: {}", e);
                Settlement::offline(format!("hotspot fallback failed: {}", e))
            }
        }
    }

    /// Start, wait for the daemon to initialize, confirm it is active; retry
    pub(super) async fn verified_hotspot(&self, kind: HotspotStart) -> Settlement {
        if kind == HotspotStart::Normal && !self.inner.config.wireless_enabled() {
            info!("Fallback: WiFi disabled. No hotspot started.");
            return Settlement::WirelessDisabled;
        }

        self.prepare_radio_for_hotspot().await;

        let timings = &self.inner.timings;
        let retries = timings.hotspot_retries.max(1);
        for attempt in 1..=retries {
            match self.start_hotspot(kind).await {
                StartResult::Disabled => {
                    return Settlement::offline("hotspot disabled in configuration");
                }
                StartResult::Failed(e) => {
                    info!("Hotspot launch failed ({}). Retry {} of {}", e, attempt, retries);
                }
                StartResult::Started => {
                    // An immediate check misreads a still-initializing daemon
                    tokio::time::sleep(timings.hostapd_startup).await;
                    if self.inner.platform.access_point_active().await {
                        info!("Hotspot active and hostapd is running.");
                        return Settlement::Hotspot;
                    }
                    info!(
                        "Hostapd did not reach active state. Retry {} of {}",
                        attempt, retries
                    );
                }
            }
            if attempt < retries {
                tokio::time::sleep(timings.hotspot_retry_delay).await;
            }
        }

        info!("Hotspot failed after maximum retries. System remains offline.");
        Settlement::offline("hotspot failed after maximum retries, unreachable by radio")
    }

    /// Tear down the station first unless the radio runs AP and station together
    async fn prepare_radio_for_hotspot(&self) {
        let concurrent = match self.inner.platform.wiphy_info().await {
            Ok(report) => supports_concurrent(&report),
            Err(e) => {
                info!("WIRELESS: Failed to determine interface mode support: {}", e);
                false
            }
        };

        if concurrent {
            info!("Concurrent AP+STA supported. Starting hotspot without stopping STA.");
        } else {
            info!("No concurrent mode. Stopping STA and starting hotspot.");
            self.stop_station().await;
            tokio::time::sleep(self.inner.timings.station_settle).await;
        }
    }

    async fn start_hotspot(&self, kind: HotspotStart) -> StartResult {
        let platform = &self.inner.platform;
        let wlan = self.wlan();
        self.stop_hotspot().await;

        if kind == HotspotStart::Normal && !self.inner.config.hotspot_enabled() {
            info!("Hotspot is disabled, not starting it");
            if let Err(e) = platform.link_up(wlan).await {
                debug!("configwlanup: {}", e);
            }
            return StartResult::Disabled;
        }

        if let Err(e) = platform.configure_hotspot_address(wlan).await {
            debug!("confighotspot: {}", e);
        }
        let started = platform.start_access_point().await;
        self.spawn_ip_changed_trigger();

        match started {
            Ok(()) => StartResult::Started,
            Err(e) => StartResult::Failed(e.to_string()),
        }
    }

    /// Address-change consumers must notice the hotspot address
    fn spawn_ip_changed_trigger(&self) {
        let platform = Arc::clone(&self.inner.platform);
        let wlan = self.wlan().to_string();
        let delay = self.inner.timings.hostapd_exit_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match platform.trigger_ip_changed(&wlan).await {
                Ok(()) => debug!("Triggered ip-changed@{}.target for hotspot IP", wlan),
                Err(e) => debug!("Could not trigger ip-changed target: {}", e),
            }
        });
    }
}
