//! Filesystem layout used by the daemon and its consumers.
//!
//! Every location is derived from a single root so tests can re-root the
//! whole layout into a temporary directory.

use std::path::{Path, PathBuf};

/// Kernel network device tree
pub const SYS_CLASS_NET: &str = "/sys/class/net";

/// Persistent data partition
pub const DATA_DIR: &str = "/data";

/// Volatile scratch directory
pub const TMP_DIR: &str = "/tmp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonPaths {
    /// Network device tree (`/sys/class/net`)
    pub sys_class_net: PathBuf,
    /// `KEY=value` environment parameters
    pub env_file: PathBuf,
    /// OS release descriptor, used to pick the supplicant driver
    pub os_release: PathBuf,
    /// Regulatory domain persisted for the next boot
    pub crda_config: PathBuf,
    /// Supplicant network profiles
    pub supplicant_config: PathBuf,
    /// Runtime network settings (JSON)
    pub network_config: PathBuf,
    /// Packaged network settings used on first boot
    pub default_network_config: PathBuf,
    /// Present once network setup has been completed
    pub net_configured: PathBuf,
    /// Optional static address command line replacing the DHCP client
    pub wlan_static: PathBuf,
    /// Single-word WiFi status: connected | hotspot | disconnected
    pub wlan_status: PathBuf,
    /// Wired link status cache: connected | disconnected
    pub eth_status: PathBuf,
    /// Single network mode indicator for the backend
    pub snm_status: PathBuf,
    /// Present once a client connection has ever succeeded
    pub wireless_established: PathBuf,
    /// One-shot trigger forcing hotspot mode, deleted on read
    pub force_hotspot: PathBuf,
    /// Decision file whose mtime signals watchers of a status change
    pub network_status: PathBuf,
    /// Diagnostic log
    pub log_file: PathBuf,
}

impl Default for DaemonPaths {
    fn default() -> Self {
        Self::with_root(Path::new("/"))
    }
}

impl DaemonPaths {
    /// Production layout placed under `root`
    pub fn with_root(root: &Path) -> Self {
        let at = |p: &str| root.join(p.trim_start_matches('/'));
        let data = |p: &str| at(&format!("{}/{}", DATA_DIR, p));
        let tmp = |p: &str| at(&format!("{}/{}", TMP_DIR, p));

        Self {
            sys_class_net: at(SYS_CLASS_NET),
            env_file: at("/volumio/.env"),
            os_release: at("/etc/os-release"),
            crda_config: at("/etc/default/crda"),
            supplicant_config: at("/etc/wpa_supplicant/wpa_supplicant.conf"),
            network_config: data("configuration/system_controller/network/config.json"),
            default_network_config: at(
                "/volumio/app/plugins/system_controller/network/config.json",
            ),
            net_configured: data("configuration/netconfigured"),
            wlan_static: data("configuration/wlanstatic"),
            wlan_status: data("wlan0status"),
            eth_status: data("eth0status"),
            snm_status: data("snm_status"),
            wireless_established: data("flagfiles/wirelessEstablishedOnce"),
            force_hotspot: tmp("forcehotspot"),
            network_status: tmp("networkstatus"),
            log_file: tmp("wireless.log"),
        }
    }
}
