//! Timing policy for every wait, poll and bound in the daemon.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Timings {
    /// Bound for quick utility calls (link up, wpa_cli commands)
    pub exec_short: Duration,
    /// Bound for regulatory domain queries
    pub exec_medium: Duration,
    /// Bound for service restarts and lease requests
    pub exec_long: Duration,
    /// Bound for radio scans
    pub exec_scan: Duration,
    /// Bound for a scoped kill; expiry is a no-op
    pub kill: Duration,

    pub udev_settle: Duration,
    pub readiness_poll: Duration,
    pub readiness_wait: Duration,
    pub release_wait: Duration,
    pub release_step: Duration,
    pub link_stabilize: Duration,

    pub supplicant_poll: Duration,
    pub monitor_window: Duration,

    pub dhcp_launch_delay: Duration,
    pub dhcp_settle: Duration,
    pub address_poll: Duration,
    pub connection_timeout: Duration,

    pub client_retries: u32,
    pub client_retry_delay: Duration,

    pub station_settle: Duration,
    pub hostapd_startup: Duration,
    pub hostapd_exit_delay: Duration,
    pub hotspot_retries: u32,
    pub hotspot_retry_delay: Duration,

    pub reconnect_window: Duration,
    pub mdns_check_delay: Duration,
    pub descriptor_freshness: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            exec_short: Duration::from_secs(2),
            exec_medium: Duration::from_secs(3),
            exec_long: Duration::from_secs(5),
            exec_scan: Duration::from_secs(10),
            kill: Duration::from_secs(5),

            udev_settle: Duration::from_secs(5),
            readiness_poll: Duration::from_millis(500),
            readiness_wait: Duration::from_secs(8),
            release_wait: Duration::from_secs(8),
            release_step: Duration::from_secs(1),
            link_stabilize: Duration::from_secs(1),

            supplicant_poll: Duration::from_millis(500),
            monitor_window: Duration::from_secs(60),

            dhcp_launch_delay: Duration::from_secs(1),
            dhcp_settle: Duration::from_secs(2),
            address_poll: Duration::from_secs(1),
            connection_timeout: Duration::from_secs(30),

            client_retries: 3,
            client_retry_delay: Duration::from_secs(2),

            station_settle: Duration::from_secs(3),
            hostapd_startup: Duration::from_secs(1),
            hostapd_exit_delay: Duration::from_millis(500),
            hotspot_retries: 3,
            hotspot_retry_delay: Duration::from_secs(3),

            reconnect_window: Duration::from_secs(3),
            mdns_check_delay: Duration::from_secs(2),
            descriptor_freshness: Duration::from_secs(5),
        }
    }
}
