//! Platform backed by the standard Linux network utilities.

use super::parse;
use super::{ManagedDaemon, Platform, SupplicantCommand};
use crate::error::{PlatformError, PlatformResult};
use crate::process::{CommandLine, KillTarget, LaunchMode, ProcessController};
use crate::timings::Timings;
use async_trait::async_trait;
use netmode_common::{supplicant_driver, DaemonPaths};
use std::fs;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info};

/// Fixed address served by the hotspot
pub const HOTSPOT_ADDRESS: &str = "192.168.211.1";

const ACCESS_POINT_UNIT: &str = "hostapd.service";
const DHCP_UNIT: &str = "dhcpcd.service";
const MDNS_UNIT: &str = "avahi-daemon";

/// Privilege wrapper and driver selection
#[derive(Debug, Clone)]
pub struct SystemTools {
    /// Prefix for commands needing root, None when already root
    pub sudo: Option<String>,
    /// Supplicant driver list
    pub driver: String,
}

impl SystemTools {
    pub fn detect(paths: &DaemonPaths) -> Self {
        let is_root = nix::unistd::geteuid().is_root();
        Self {
            sudo: if is_root { None } else { Some("sudo".to_string()) },
            driver: supplicant_driver(&paths.os_release).to_string(),
        }
    }
}

pub struct SystemPlatform {
    processes: ProcessController,
    tools: SystemTools,
    paths: DaemonPaths,
    timings: Timings,
}

impl SystemPlatform {
    pub fn new(paths: DaemonPaths, timings: Timings) -> Self {
        let tools = SystemTools::detect(&paths);
        debug!("Platform: supplicant driver {}, sudo {:?}", tools.driver, tools.sudo);
        Self {
            processes: ProcessController::new(timings.kill, timings.exec_short),
            tools,
            paths,
            timings,
        }
    }

    fn root(&self, command: CommandLine) -> CommandLine {
        command.privileged(self.tools.sudo.as_deref())
    }

    async fn run(
        &self,
        label: &str,
        command: CommandLine,
        bound: Duration,
    ) -> PlatformResult<String> {
        self.processes
            .launch(label, &command, LaunchMode::Wait(bound))
            .await
            .map(|out| out.stdout)
    }

    async fn run_root(
        &self,
        label: &str,
        command: CommandLine,
        bound: Duration,
    ) -> PlatformResult<String> {
        let command = self.root(command);
        self.run(label, command, bound).await
    }

    fn ip(&self, args: &[&str]) -> CommandLine {
        CommandLine::new("ip").args(args.iter().copied())
    }

    fn wpa_cli(&self, iface: &str) -> CommandLine {
        CommandLine::new("wpa_cli").args(["-i", iface])
    }

    fn systemctl(&self, verb: &str, unit: &str) -> CommandLine {
        CommandLine::new("systemctl").args([verb, unit])
    }

    async fn unit_active(&self, unit: &str) -> bool {
        let command = self.systemctl("is-active", unit);
        match self.run("systemctl", command, self.timings.exec_short).await {
            Ok(out) => out.trim() == "active",
            Err(e) => {
                debug!("{} is not active: {}", unit, e);
                false
            }
        }
    }

    /// DHCP client command line, replaced by the static address file if present
    fn dhcp_command(&self, iface: &str) -> CommandLine {
        match fs::read_to_string(&self.paths.wlan_static) {
            Ok(content) => match CommandLine::parse(content.trim()) {
                Some(command) => {
                    info!("FIXED IP via {}", self.paths.wlan_static.display());
                    command
                }
                None => {
                    debug!("Static address file is empty, using DHCP");
                    CommandLine::new("dhcpcd").arg(iface)
                }
            },
            Err(_) => {
                info!("DHCP IP fallback");
                CommandLine::new("dhcpcd").arg(iface)
            }
        }
    }
}

#[async_trait]
impl Platform for SystemPlatform {
    async fn deconfigure(&self, iface: &str) -> PlatformResult<()> {
        let flush = self.flush_addresses(iface).await;
        let command = self.ip(&["link", "set", iface, "down"]);
        let down = self
            .run_root("ifdeconfig", command, self.timings.exec_short)
            .await
            .map(|_| ());
        flush.and(down)
    }

    async fn flush_addresses(&self, iface: &str) -> PlatformResult<()> {
        let command = self.ip(&["addr", "flush", "dev", iface]);
        self.run_root("flush_ip", command, self.timings.exec_short)
            .await
            .map(|_| ())
    }

    async fn link_up(&self, iface: &str) -> PlatformResult<()> {
        let command = self.ip(&["link", "set", iface, "up"]);
        self.run_root("ifconfig_up", command, self.timings.exec_short)
            .await
            .map(|_| ())
    }

    async fn configure_hotspot_address(&self, iface: &str) -> PlatformResult<()> {
        self.run_root(
            "confighotspot",
            CommandLine::new("ifconfig").args([iface, HOTSPOT_ADDRESS, "up"]),
            self.timings.exec_short,
        )
        .await
        .map(|_| ())
    }

    async fn udev_settle(&self, timeout: Duration) -> PlatformResult<()> {
        let command = CommandLine::new("udevadm")
            .arg("settle")
            .arg(format!("--timeout={}", timeout.as_secs()));
        // udevadm enforces its own bound; ours only catches a hung binary
        self.run_root("udev_settle", command, timeout + Duration::from_secs(1))
            .await
            .map(|_| ())
    }

    async fn addresses(&self, iface: &str) -> PlatformResult<Vec<IpAddr>> {
        let command = self.ip(&["-o", "addr", "show", "dev", iface]);
        let out = self
            .run("ip_addr", command, self.timings.exec_short)
            .await?;
        Ok(parse::parse_addresses(&out))
    }

    async fn start_supplicant(&self, iface: &str) -> PlatformResult<()> {
        let command = CommandLine::new("wpa_supplicant").args([
            "-s".to_string(),
            "-B".to_string(),
            format!("-D{}", self.tools.driver),
            "-c".to_string(),
            self.paths.supplicant_config.display().to_string(),
            "-i".to_string(),
            iface.to_string(),
        ]);
        self.run_root("wpa supplicant", command, self.timings.exec_long)
            .await
            .map(|_| ())
    }

    async fn supplicant_command(
        &self,
        iface: &str,
        command: SupplicantCommand,
    ) -> PlatformResult<()> {
        let out = self
            .run_root(
                &format!("wpa_{}", command.as_str()),
                self.wpa_cli(iface).arg(command.as_str()),
                self.timings.exec_short,
            )
            .await?;
        // wpa_cli exits 0 even when the control socket rejects the request
        if out.trim() == "FAIL" {
            return Err(PlatformError::Unavailable(format!(
                "supplicant rejected {}",
                command.as_str()
            )));
        }
        Ok(())
    }

    async fn supplicant_status(&self, iface: &str) -> PlatformResult<String> {
        let out = self
            .run_root("wpa_status", self.wpa_cli(iface).arg("status"), self.timings.exec_short)
            .await?;
        if !out.contains("wpa_state=") {
            return Err(PlatformError::Unavailable(format!(
                "supplicant on {} not responding",
                iface
            )));
        }
        Ok(out)
    }

    async fn supplicant_running(&self, iface: &str) -> bool {
        self.processes
            .is_running(&format!("{}.*{}", ManagedDaemon::Supplicant.program(), iface))
            .await
    }

    async fn current_ssid(&self, iface: &str) -> Option<String> {
        let command = CommandLine::new("iwgetid").args([iface, "-r"]);
        self.run("iwgetid", command, self.timings.exec_short)
            .await
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    async fn scan_ssids(&self, iface: &str) -> PlatformResult<Vec<String>> {
        let command = CommandLine::new("iw").args([iface, "scan"]);
        let out = self
            .run_root("iw_scan", command, self.timings.exec_scan)
            .await?;
        Ok(parse::parse_scan_ssids(&out))
    }

    async fn start_dhcp_client(&self, iface: &str) -> PlatformResult<()> {
        let command = self.root(self.dhcp_command(iface));
        let mode = LaunchMode::Detached {
            interface: iface.to_string(),
        };
        self.processes
            .launch(ManagedDaemon::DhcpClient.label(), &command, mode)
            .await
            .map(|_| ())
    }

    async fn dhcp_client_running(&self, iface: &str) -> bool {
        self.processes
            .is_running(&format!("{}.*{}", ManagedDaemon::DhcpClient.program(), iface))
            .await
    }

    async fn restart_dhcp_service(&self) -> PlatformResult<()> {
        let command = self.systemctl("restart", DHCP_UNIT);
        self.run_root("restart_dhcpcd", command, self.timings.exec_long)
            .await
            .map(|_| ())
    }

    async fn release_dhcp_lease(&self, iface: &str) -> PlatformResult<()> {
        let command = CommandLine::new("dhcpcd").args(["-k", iface]);
        self.run_root("dhcp_release", command, self.timings.exec_short)
            .await
            .map(|_| ())
    }

    async fn request_fresh_lease(&self, iface: &str) -> PlatformResult<()> {
        let command = CommandLine::new("dhcpcd").args(["-n", iface]);
        self.run_root("dhcp_renew", command, self.timings.exec_long)
            .await
            .map(|_| ())
    }

    async fn start_access_point(&self) -> PlatformResult<()> {
        let command = self.systemctl("start", ACCESS_POINT_UNIT);
        self.run_root("hotspot", command, self.timings.exec_long)
            .await
            .map(|_| ())
    }

    async fn stop_access_point(&self) -> PlatformResult<()> {
        let command = self.systemctl("stop", ACCESS_POINT_UNIT);
        self.run_root("stophotspot", command, self.timings.exec_long)
            .await
            .map(|_| ())
    }

    async fn access_point_active(&self) -> bool {
        self.unit_active("hostapd").await
    }

    async fn wiphy_info(&self) -> PlatformResult<String> {
        self.run("iw_list", CommandLine::new("iw").arg("list"), self.timings.exec_long)
            .await
    }

    async fn kill_scoped(&self, daemon: ManagedDaemon, iface: &str) {
        let target = KillTarget::scoped(daemon.label(), daemon.program(), iface);
        self.processes.kill(&target).await;
    }

    async fn restart_mdns(&self) -> PlatformResult<()> {
        let command = self.systemctl("restart", MDNS_UNIT);
        self.run_root("restart_avahi", command, self.timings.exec_long)
            .await
            .map(|_| ())
    }

    async fn mdns_active(&self) -> bool {
        self.unit_active(MDNS_UNIT).await
    }

    async fn notify_ready(&self) -> PlatformResult<()> {
        let command = CommandLine::new("systemd-notify").arg("--ready");
        self.run("systemd-notify", command, self.timings.exec_short)
            .await
            .map(|_| ())
    }

    async fn trigger_ip_changed(&self, iface: &str) -> PlatformResult<()> {
        self.run_root(
            "ip_changed",
            self.systemctl("restart", &format!("ip-changed@{}.target", iface)),
            self.timings.exec_short,
        )
        .await
        .map(|_| ())
    }

    async fn regdomain(&self, iface: &str) -> PlatformResult<String> {
        self.link_up(iface).await?;
        let command = CommandLine::new("iw").args(["reg", "get"]);
        let out = self
            .run("iw_reg_get", command, self.timings.exec_medium)
            .await?;
        Ok(parse::parse_regdomain(&out))
    }

    async fn beacon_countries(&self, iface: &str) -> PlatformResult<Vec<String>> {
        self.link_up(iface).await?;
        let command = CommandLine::new("iw").args([iface, "scan"]);
        let out = self
            .run_root("iw_scan", command, self.timings.exec_scan)
            .await?;
        Ok(parse::parse_scan_countries(&out))
    }

    async fn set_regdomain(&self, iface: &str, code: &str) -> PlatformResult<()> {
        self.link_up(iface).await?;
        let command = CommandLine::new("iw").args(["reg", "set", code]);
        self.run_root("iw_reg_set", command, self.timings.exec_medium)
            .await
            .map(|_| ())
    }
}
