//! Connection Arbitrator
//!
//! Top-level state machine deciding between WiFi client, hotspot and
//! offline. One `run` is one arbitration flow:
//!
//! ```text
//! stop previous session -> regulatory domain -> entry decision
//!   HotspotForced | EmergencyOverride | WirelessDisabled | ScanMode
//!   | DirectHotspot | Client -> { ClientConnected | fallback evaluation }
//! -> publish exactly one decision -> readiness notification
//! ```
//!
//! Runs never overlap: a run (or a lightweight reconnect) requested while
//! another is active is dropped, not queued.

mod client;
pub mod context;
pub mod decision;
mod hotspot;
mod reconnect;
mod scan_mode;

pub use context::{ArbitrationContext, FlowGuard, GuardKind, Mode, SharedContext};
pub use decision::{FallbackConditions, FallbackDecision, StartConditions, StartPath};

use crate::auth::{AuthMonitor, StateTimeouts};
use crate::capabilities::AdapterCapabilities;
use crate::inspector::InterfaceInspector;
use crate::platform::{ManagedDaemon, Platform};
use crate::regdomain;
use crate::timings::Timings;
use netmode_common::{
    ConfigGateway, DaemonPaths, Markers, NetworkDecision, PublishedStatus, StatusPublisher,
};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Interfaces under arbitration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interfaces {
    pub wlan: String,
    pub wired: String,
}

impl Default for Interfaces {
    fn default() -> Self {
        Self {
            wlan: "wlan0".to_string(),
            wired: "eth0".to_string(),
        }
    }
}

/// Terminal state of one arbitration flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    ClientConnected { ssid: Option<String> },
    Hotspot,
    ScanMode,
    WirelessDisabled,
    Offline { reason: String },
}

impl Settlement {
    pub(crate) fn offline(reason: impl Into<String>) -> Self {
        Settlement::Offline {
            reason: reason.into(),
        }
    }

    pub fn decision(&self) -> NetworkDecision {
        match self {
            Settlement::ClientConnected { .. } => NetworkDecision::Ap,
            Settlement::Hotspot => NetworkDecision::Hotspot,
            Settlement::ScanMode | Settlement::WirelessDisabled | Settlement::Offline { .. } => {
                NetworkDecision::Offline
            }
        }
    }

    pub fn scan_mode(&self) -> bool {
        matches!(self, Settlement::ScanMode)
    }

    fn mode(&self) -> Mode {
        match self {
            Settlement::ClientConnected { .. } => Mode::ClientConnected,
            Settlement::Hotspot => Mode::Hotspot,
            _ => Mode::Offline,
        }
    }
}

struct Inner {
    platform: Arc<dyn Platform>,
    inspector: InterfaceInspector,
    auth: AuthMonitor,
    config: ConfigGateway,
    markers: Markers,
    publisher: StatusPublisher,
    paths: DaemonPaths,
    timings: Timings,
    interfaces: Interfaces,
    context: SharedContext,
    usb_capabilities: Mutex<Option<AdapterCapabilities>>,
}

#[derive(Clone)]
pub struct Arbitrator {
    inner: Arc<Inner>,
}

impl Arbitrator {
    pub fn new(
        platform: Arc<dyn Platform>,
        paths: DaemonPaths,
        timings: Timings,
        interfaces: Interfaces,
        single_network_mode: bool,
    ) -> Self {
        let markers = Markers::new(paths.clone());
        let context = ArbitrationContext::new(single_network_mode, markers.ever_connected());
        let auth = AuthMonitor::new(
            Arc::clone(&platform),
            StateTimeouts::default(),
            timings.supplicant_poll,
            timings.monitor_window,
        );
        let inspector = InterfaceInspector::new(
            paths.sys_class_net.clone(),
            timings.descriptor_freshness,
            timings.readiness_poll,
        );

        Self {
            inner: Arc::new(Inner {
                platform,
                inspector,
                auth,
                config: ConfigGateway::new(paths.clone()),
                markers,
                publisher: StatusPublisher::new(paths.clone()),
                paths,
                timings,
                interfaces,
                context: Arc::new(Mutex::new(context)),
                usb_capabilities: Mutex::new(None),
            }),
        }
    }

    pub fn context(&self) -> &SharedContext {
        &self.inner.context
    }

    /// Snapshot of the arbitration context
    pub fn snapshot(&self) -> ArbitrationContext {
        self.inner
            .context
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.inner.platform
    }

    pub fn inspector(&self) -> &InterfaceInspector {
        &self.inner.inspector
    }

    pub fn publisher(&self) -> &StatusPublisher {
        &self.inner.publisher
    }

    pub fn paths(&self) -> &DaemonPaths {
        &self.inner.paths
    }

    pub fn interfaces(&self) -> &Interfaces {
        &self.inner.interfaces
    }

    pub fn timings(&self) -> &Timings {
        &self.inner.timings
    }

    fn wlan(&self) -> &str {
        &self.inner.interfaces.wlan
    }

    fn wired_active(&self) -> bool {
        self.snapshot().wired_active
    }

    fn set_mode(&self, mode: Mode) {
        self.inner
            .context
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .mode = mode;
    }

    /// One full arbitration flow
    ///
    /// Returns None when another flow is already active.
    pub async fn run(&self) -> Option<Settlement> {
        let Some(_flow) = FlowGuard::acquire(&self.inner.context, GuardKind::Flow) else {
            debug!("Wireless flow already in progress, ignoring duplicate call");
            return None;
        };

        info!("Initializing wireless flow");
        self.stop().await;
        info!("Cleaning previous...");

        if self.inner.config.wireless_enabled() {
            regdomain::detect_and_apply(
                self.inner.platform.as_ref(),
                self.wlan(),
                &self.inner.paths.crda_config,
            )
            .await;
        }

        let settlement = self.start_flow().await;
        self.settle(&settlement);
        Some(settlement)
    }

    /// Entry decision and the selected path
    async fn start_flow(&self) -> Settlement {
        {
            let mut ctx = self.inner.context.lock().unwrap_or_else(|e| e.into_inner());
            ctx.retry_count = 0;
        }

        let network_configured = self.inner.markers.network_configured();
        if !network_configured {
            info!("netconfigured file not found, starting hotspot");
        }

        let ctx = self.snapshot();
        let conditions = StartConditions {
            force_hotspot: self.inner.markers.take_force_hotspot(),
            wireless_enabled: self.inner.config.wireless_enabled(),
            wired_active: ctx.wired_active,
            single_network_mode: ctx.single_network_mode,
            network_configured,
        };
        let path = StartPath::evaluate(&conditions);
        debug!("Start conditions {:?} -> {:?}", conditions, path);

        match path {
            StartPath::HotspotForced => {
                info!("Wireless networking forced to hotspot mode");
                self.forced_hotspot().await
            }
            StartPath::EmergencyOverride => {
                info!("=== EMERGENCY OVERRIDE ===");
                info!("WiFi DISABLED in config, but no ethernet available");
                info!("Forcing hotspot for system accessibility");
                info!("User can disable hotspot after connecting via emergency AP");
                info!("==========================");
                self.verified_hotspot(hotspot::HotspotStart::Forced).await
            }
            StartPath::WirelessDisabled => {
                info!("Wireless Networking DISABLED, not starting wireless flow");
                Settlement::WirelessDisabled
            }
            StartPath::ScanMode => {
                info!("Single Network Mode: Ethernet active, maintaining WiFi scan capability");
                self.enter_scan_mode().await
            }
            StartPath::DirectHotspot => {
                info!("First boot: Starting hotspot with verification");
                self.verified_hotspot(hotspot::HotspotStart::Normal).await
            }
            StartPath::Client => {
                info!("Start wireless flow");
                self.client_flow().await
            }
        }
    }

    /// Publish a terminal state and signal readiness
    fn settle(&self, settlement: &Settlement) -> PublishedStatus {
        if let Settlement::Offline { reason } = settlement {
            info!("Settled offline: {}", reason);
        }
        self.set_mode(settlement.mode());
        let published = self
            .inner
            .publisher
            .publish(settlement.decision(), settlement.scan_mode());
        self.spawn_ready_notification();
        published
    }

    /// Readiness must not wait for the outcome of slow steps
    fn spawn_ready_notification(&self) {
        let platform = Arc::clone(&self.inner.platform);
        tokio::spawn(async move {
            match platform.notify_ready().await {
                Ok(()) => info!("Notified systemd about wireless ready"),
                Err(e) => info!("Could not notify systemd about wireless ready: {}", e),
            }
        });
    }

    /// Tear down client and hotspot state on the WiFi interface
    ///
    /// Safe to call when nothing is running.
    pub async fn stop(&self) {
        self.inner.auth.stop();
        self.stop_station().await;
        self.stop_hotspot().await;
    }

    /// Kill the DHCP client and supplicant bound to the WiFi interface
    async fn stop_station(&self) {
        debug!("stopAP: BEGIN");
        let platform = &self.inner.platform;
        platform.kill_scoped(ManagedDaemon::DhcpClient, self.wlan()).await;
        platform.kill_scoped(ManagedDaemon::Supplicant, self.wlan()).await;
        debug!("stopAP: END");
    }

    async fn stop_hotspot(&self) {
        if let Err(e) = self.inner.platform.stop_access_point().await {
            debug!("stophotspot: {}", e);
        }
        if let Err(e) = self.inner.platform.deconfigure(self.wlan()).await {
            debug!("ifdeconfig: {}", e);
        }
    }

    /// Restart the mDNS advertiser and check on it later
    async fn restart_mdns(&self) {
        info!("Restarting avahi-daemon...");
        if let Err(e) = self.inner.platform.restart_mdns().await {
            warn!("Could not restart Avahi: {}", e);
            return;
        }

        let platform = Arc::clone(&self.inner.platform);
        let delay = self.inner.timings.mdns_check_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if platform.mdns_active().await {
                debug!("Avahi successfully restarted and active");
            } else {
                info!("Avahi restart completed but service not active");
            }
        });
    }
}
