//! Platform capability interface
//!
//! Everything the arbitration logic needs from the operating system, as one
//! object-safe trait. `SystemPlatform` drives the real network utilities;
//! tests substitute a scripted implementation.
//!
//! Methods returning `PlatformResult` may fail without consequence for the
//! caller's control flow beyond logging; boolean queries fold every failure
//! into `false`.

pub mod parse;
pub mod system;

pub use parse::{is_placeholder, usable_addresses};
pub use system::SystemPlatform;

use crate::error::PlatformResult;
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

/// Control commands understood by a running supplicant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplicantCommand {
    /// Re-read the configuration file
    Reconfigure,
    /// Drop the association and stay idle
    Disconnect,
    /// Re-associate using the current configuration
    Reconnect,
}

impl SupplicantCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupplicantCommand::Reconfigure => "reconfigure",
            SupplicantCommand::Disconnect => "disconnect",
            SupplicantCommand::Reconnect => "reconnect",
        }
    }
}

/// Per-interface daemons that can be killed by scoped pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagedDaemon {
    DhcpClient,
    Supplicant,
}

impl ManagedDaemon {
    pub fn label(&self) -> &'static str {
        match self {
            ManagedDaemon::DhcpClient => "dhcp client",
            ManagedDaemon::Supplicant => "wpa supplicant",
        }
    }

    pub fn program(&self) -> &'static str {
        match self {
            ManagedDaemon::DhcpClient => "dhcpcd",
            ManagedDaemon::Supplicant => "wpa_supplicant",
        }
    }
}

#[async_trait]
pub trait Platform: Send + Sync {
    // ---- link configuration ----

    /// Flush addresses and bring the link administratively down
    async fn deconfigure(&self, iface: &str) -> PlatformResult<()>;

    async fn flush_addresses(&self, iface: &str) -> PlatformResult<()>;

    async fn link_up(&self, iface: &str) -> PlatformResult<()>;

    /// Assign the fixed hotspot address and bring the link up
    async fn configure_hotspot_address(&self, iface: &str) -> PlatformResult<()>;

    /// Wait for the device manager's event queue to drain
    async fn udev_settle(&self, timeout: Duration) -> PlatformResult<()>;

    /// Assigned addresses, placeholders included
    async fn addresses(&self, iface: &str) -> PlatformResult<Vec<IpAddr>>;

    // ---- authentication client ----

    /// Launch the supplicant daemonized and wait for its startup to finish
    async fn start_supplicant(&self, iface: &str) -> PlatformResult<()>;

    async fn supplicant_command(&self, iface: &str, command: SupplicantCommand)
        -> PlatformResult<()>;

    /// Raw `key=value` status report
    async fn supplicant_status(&self, iface: &str) -> PlatformResult<String>;

    async fn supplicant_running(&self, iface: &str) -> bool;

    /// SSID of the current association
    async fn current_ssid(&self, iface: &str) -> Option<String>;

    /// SSIDs visible in a fresh scan
    async fn scan_ssids(&self, iface: &str) -> PlatformResult<Vec<String>>;

    // ---- address acquisition ----

    /// Launch the DHCP client (or the static address override) detached
    async fn start_dhcp_client(&self, iface: &str) -> PlatformResult<()>;

    async fn dhcp_client_running(&self, iface: &str) -> bool;

    async fn restart_dhcp_service(&self) -> PlatformResult<()>;

    async fn release_dhcp_lease(&self, iface: &str) -> PlatformResult<()>;

    async fn request_fresh_lease(&self, iface: &str) -> PlatformResult<()>;

    // ---- access point ----

    async fn start_access_point(&self) -> PlatformResult<()>;

    async fn stop_access_point(&self) -> PlatformResult<()>;

    async fn access_point_active(&self) -> bool;

    /// Raw wireless hardware capability listing
    async fn wiphy_info(&self) -> PlatformResult<String>;

    // ---- process control ----

    /// Kill a daemon instance bound to `iface` only
    async fn kill_scoped(&self, daemon: ManagedDaemon, iface: &str);

    // ---- system services ----

    async fn restart_mdns(&self) -> PlatformResult<()>;

    async fn mdns_active(&self) -> bool;

    /// Tell the service manager the daemon is operational
    async fn notify_ready(&self) -> PlatformResult<()>;

    /// Poke consumers of address changes on `iface`
    async fn trigger_ip_changed(&self, iface: &str) -> PlatformResult<()>;

    // ---- regulatory domain ----

    /// Current regulatory domain code, empty when unset
    async fn regdomain(&self, iface: &str) -> PlatformResult<String>;

    /// Country codes advertised by nearby beacons, in scan order
    async fn beacon_countries(&self, iface: &str) -> PlatformResult<Vec<String>>;

    async fn set_regdomain(&self, iface: &str, code: &str) -> PlatformResult<()>;
}
