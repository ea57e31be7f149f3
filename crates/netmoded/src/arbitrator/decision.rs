//! Pure decision tables of the arbitration state machine.

/// Inputs of the entry decision, sampled once per run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartConditions {
    /// One-shot force-hotspot marker was present (and has been consumed)
    pub force_hotspot: bool,
    pub wireless_enabled: bool,
    pub wired_active: bool,
    pub single_network_mode: bool,
    /// Network setup has been completed at least once
    pub network_configured: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPath {
    /// Support/factory-reset trigger; overrides everything
    HotspotForced,
    /// Wireless disabled but nothing else reachable
    EmergencyOverride,
    WirelessDisabled,
    /// Ethernet carries traffic; radio stays up without an address
    ScanMode,
    /// Nothing to connect to yet
    DirectHotspot,
    Client,
}

impl StartPath {
    /// Entry decision in strict priority order
    pub fn evaluate(c: &StartConditions) -> Self {
        if c.force_hotspot {
            StartPath::HotspotForced
        } else if !c.wireless_enabled {
            if c.wired_active {
                StartPath::WirelessDisabled
            } else {
                StartPath::EmergencyOverride
            }
        } else if c.single_network_mode && c.wired_active {
            StartPath::ScanMode
        } else if !c.network_configured {
            StartPath::DirectHotspot
        } else {
            StartPath::Client
        }
    }
}

/// Inputs of the post-failure decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackConditions {
    pub fallback_enabled: bool,
    /// Configured network name seen in a fresh scan
    pub ssid_visible: bool,
    pub ever_connected: bool,
    pub wireless_enabled: bool,
    pub wired_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackDecision {
    Hotspot,
    /// Total connectivity loss: verified hotspot regardless of configuration
    EmergencyHotspot,
    /// Reachable over ethernet; leave the radio alone
    Offline,
}

impl FallbackDecision {
    pub fn evaluate(c: &FallbackConditions) -> Self {
        let wanted = c.fallback_enabled || !c.ssid_visible || !c.ever_connected;
        if wanted && c.wireless_enabled {
            FallbackDecision::Hotspot
        } else if !c.wired_active {
            FallbackDecision::EmergencyHotspot
        } else {
            FallbackDecision::Offline
        }
    }
}
