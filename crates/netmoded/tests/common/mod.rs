//! Scripted platform and fake device tree for arbitration tests.
//!
//! `FakePlatform` records every call with the (paused) tokio clock and
//! answers from a small mutable model of the WiFi interface. The supplicant
//! state follows a timeline measured from the last supplicant launch.

#![allow(dead_code)]

use async_trait::async_trait;
use netmode_common::DaemonPaths;
use netmoded::arbitrator::{Arbitrator, Interfaces};
use netmoded::platform::{ManagedDaemon, Platform, SupplicantCommand};
use netmoded::{PlatformError, PlatformResult, Timings};
use std::fs;
use std::net::IpAddr;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

pub const WLAN_MAC: &str = "b8:27:eb:00:00:01";
pub const ETH_MAC: &str = "b8:27:eb:00:00:02";

// ============================================================================
// Device tree and file layout
// ============================================================================

pub struct Fixture {
    pub temp: TempDir,
    pub paths: DaemonPaths,
}

impl Fixture {
    /// Onboard WiFi (link down) and a disconnected ethernet port, network
    /// setup completed, no runtime settings
    pub fn new() -> Self {
        Self::with_wlan(false)
    }

    pub fn with_wlan(usb: bool) -> Self {
        let temp = TempDir::new().unwrap();
        let paths = DaemonPaths::with_root(temp.path());
        let fixture = Self { temp, paths };
        fixture.add_iface("wlan0", WLAN_MAC, "down", usb);
        fixture.add_iface("eth0", ETH_MAC, "down", false);
        fixture.set_carrier("eth0", false);
        fixture.touch(&fixture.paths.net_configured);
        fixture
    }

    fn devices(&self) -> PathBuf {
        self.temp.path().join("sys/devices")
    }

    pub fn add_iface(&self, name: &str, mac: &str, operstate: &str, usb: bool) {
        let bus = if usb {
            "platform/soc/usb1/1-1/1-1:1.0"
        } else {
            "platform/soc/mmc1/mmc1:0001/mmc1:0001:1"
        };
        let device = self.devices().join(bus).join("net").join(name);
        fs::create_dir_all(&device).unwrap();
        fs::write(device.join("address"), format!("{}\n", mac)).unwrap();
        fs::write(device.join("operstate"), format!("{}\n", operstate)).unwrap();
        fs::write(device.join("flags"), "0x1003\n").unwrap();
        symlink(self.devices().join(bus), device.join("device")).unwrap();

        fs::create_dir_all(&self.paths.sys_class_net).unwrap();
        symlink(&device, self.paths.sys_class_net.join(name)).unwrap();
    }

    pub fn iface_dir(&self, name: &str) -> PathBuf {
        self.paths.sys_class_net.join(name)
    }

    pub fn set_carrier(&self, name: &str, up: bool) {
        fs::write(
            self.iface_dir(name).join("carrier"),
            if up { "1\n" } else { "0\n" },
        )
        .unwrap();
    }

    pub fn set_operstate(&self, name: &str, state: &str) {
        fs::write(self.iface_dir(name).join("operstate"), format!("{}\n", state)).unwrap();
    }

    pub fn set_mac(&self, name: &str, mac: &str) {
        fs::write(self.iface_dir(name).join("address"), format!("{}\n", mac)).unwrap();
    }

    pub fn write_config(&self, json: &str) {
        let path = &self.paths.network_config;
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, json).unwrap();
    }

    /// Runtime settings built from the common keys
    pub fn configure(&self, wireless: bool, hotspot: bool, fallback: bool, ssid: &str) {
        self.write_config(&format!(
            r#"{{
  "wireless_enabled": {{ "type": "boolean", "value": {} }},
  "enable_hotspot": {{ "type": "boolean", "value": {} }},
  "hotspot_fallback": {{ "type": "boolean", "value": {} }},
  "wlanssid": {{ "type": "string", "value": "{}" }}
}}"#,
            wireless, hotspot, fallback, ssid
        ));
    }

    pub fn touch(&self, path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    pub fn force_hotspot(&self) {
        self.touch(&self.paths.force_hotspot);
    }

    pub fn mark_ever_connected(&self) {
        self.touch(&self.paths.wireless_established);
    }

    pub fn unconfigure(&self) {
        let _ = fs::remove_file(&self.paths.net_configured);
    }

    pub fn read(&self, path: &Path) -> Option<String> {
        fs::read_to_string(path).ok()
    }

    pub fn arbitrator(&self, platform: Arc<FakePlatform>, single_network_mode: bool) -> Arbitrator {
        Arbitrator::new(
            platform,
            self.paths.clone(),
            Timings::default(),
            Interfaces::default(),
            single_network_mode,
        )
    }
}

// ============================================================================
// Scripted platform
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: String,
    pub at: Instant,
}

#[derive(Debug)]
pub struct FakeState {
    pub calls: Vec<Call>,

    /// Supplicant state timeline, offsets from the last launch
    pub supplicant_script: Vec<(Duration, String)>,
    pub supplicant_origin: Instant,
    pub supplicant_running: bool,
    pub supplicant_launch_fails: bool,
    /// Supplicant told to stay idle
    pub supplicant_idle: bool,
    /// State reported after a `reconnect` command
    pub reconnect_state: String,
    pub associated_ssid: Option<String>,

    /// Hardware address written to the WiFi device on every supplicant
    /// launch; the previous address moves to a new `wlanN` device
    pub rename_on_launch: bool,
    pub renames: u32,

    pub link_up: bool,
    pub addresses: Vec<IpAddr>,
    /// Addresses that appear once a DHCP client has been started
    pub dhcp_addresses: Vec<IpAddr>,
    pub dhcp_running: bool,

    pub ap_start_fails: bool,
    pub ap_becomes_active: bool,
    pub ap_active: bool,
    pub concurrent: bool,

    pub visible_ssids: Vec<String>,
    pub regdomain: String,
    pub beacon_countries: Vec<String>,
}

pub struct FakePlatform {
    sys_class_net: PathBuf,
    devices: PathBuf,
    pub state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new(fixture: &Fixture) -> Arc<Self> {
        Arc::new(Self {
            sys_class_net: fixture.paths.sys_class_net.clone(),
            devices: fixture.temp.path().join("sys/devices"),
            state: Mutex::new(FakeState {
                calls: Vec::new(),
                supplicant_script: Vec::new(),
                supplicant_origin: Instant::now(),
                supplicant_running: false,
                supplicant_launch_fails: false,
                supplicant_idle: false,
                reconnect_state: "COMPLETED".to_string(),
                associated_ssid: None,
                rename_on_launch: false,
                renames: 0,
                link_up: false,
                addresses: Vec::new(),
                dhcp_addresses: Vec::new(),
                dhcp_running: false,
                ap_start_fails: false,
                ap_becomes_active: true,
                ap_active: false,
                concurrent: false,
                visible_ssids: Vec::new(),
                regdomain: "US".to_string(),
                beacon_countries: Vec::new(),
            }),
        })
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Script the supplicant: `(seconds after launch, wpa_state)`
    pub fn script(&self, steps: &[(f64, &str)]) {
        self.with(|s| {
            s.supplicant_script = steps
                .iter()
                .map(|(at, state)| (Duration::from_secs_f64(*at), state.to_string()))
                .collect();
        });
    }

    /// Supplicant associates with `ssid` and DHCP hands out `addr`
    pub fn script_success(&self, ssid: &str, addr: &str) {
        self.script(&[(0.0, "SCANNING"), (1.0, "ASSOCIATING"), (2.0, "COMPLETED")]);
        self.with(|s| {
            s.associated_ssid = Some(ssid.to_string());
            s.dhcp_addresses = vec![addr.parse().unwrap()];
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub fn count(&self, name: &str) -> usize {
        self.with(|s| s.calls.iter().filter(|c| c.name == name).count())
    }

    pub fn times(&self, name: &str) -> Vec<Instant> {
        self.with(|s| {
            s.calls
                .iter()
                .filter(|c| c.name == name)
                .map(|c| c.at)
                .collect()
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.with(|s| s.calls.iter().map(|c| c.name.clone()).collect())
    }

    fn record(&self, name: impl Into<String>) {
        let name = name.into();
        self.with(|s| {
            s.calls.push(Call {
                name,
                at: Instant::now(),
            })
        });
    }

    fn scripted_state(s: &FakeState) -> String {
        if !s.supplicant_running {
            return "INTERFACE_DISABLED".to_string();
        }
        if s.supplicant_idle {
            return "DISCONNECTED".to_string();
        }
        let elapsed = s.supplicant_origin.elapsed();
        s.supplicant_script
            .iter()
            .rev()
            .find(|(at, _)| *at <= elapsed)
            .map(|(_, state)| state.clone())
            .unwrap_or_else(|| "DISCONNECTED".to_string())
    }

    /// Move the WiFi adapter's address to a new name, give wlan0 a new one
    fn rename_wlan(&self, s: &mut FakeState) {
        s.renames += 1;
        let wlan = self.sys_class_net.join("wlan0");
        let old_mac = fs::read_to_string(wlan.join("address")).unwrap();

        let renamed = format!("wlan{}", s.renames);
        let device = self.devices.join("renamed").join(&renamed);
        fs::create_dir_all(&device).unwrap();
        fs::write(device.join("address"), &old_mac).unwrap();
        fs::write(device.join("operstate"), "down\n").unwrap();
        symlink(&device, self.sys_class_net.join(&renamed)).unwrap();

        fs::write(
            wlan.join("address"),
            format!("02:00:00:00:00:{:02x}\n", s.renames),
        )
        .unwrap();
    }
}

fn unavailable<T>(what: &str) -> PlatformResult<T> {
    Err(PlatformError::Unavailable(what.to_string()))
}

#[async_trait]
impl Platform for FakePlatform {
    async fn deconfigure(&self, _iface: &str) -> PlatformResult<()> {
        self.record("deconfigure");
        self.with(|s| {
            s.link_up = false;
            s.addresses.clear();
        });
        Ok(())
    }

    async fn flush_addresses(&self, _iface: &str) -> PlatformResult<()> {
        self.record("flush_addresses");
        self.with(|s| s.addresses.clear());
        Ok(())
    }

    async fn link_up(&self, _iface: &str) -> PlatformResult<()> {
        self.record("link_up");
        self.with(|s| s.link_up = true);
        Ok(())
    }

    async fn configure_hotspot_address(&self, _iface: &str) -> PlatformResult<()> {
        self.record("configure_hotspot_address");
        self.with(|s| {
            s.link_up = true;
            s.addresses = vec!["192.168.211.1".parse().unwrap()];
        });
        Ok(())
    }

    async fn udev_settle(&self, _timeout: Duration) -> PlatformResult<()> {
        self.record("udev_settle");
        Ok(())
    }

    async fn addresses(&self, _iface: &str) -> PlatformResult<Vec<IpAddr>> {
        self.record("addresses");
        Ok(self.with(|s| s.addresses.clone()))
    }

    async fn start_supplicant(&self, _iface: &str) -> PlatformResult<()> {
        self.record("start_supplicant");
        let fails = self.with(|s| {
            if s.rename_on_launch {
                self.rename_wlan(s);
            }
            if s.supplicant_launch_fails {
                return true;
            }
            s.supplicant_running = true;
            s.supplicant_idle = false;
            s.supplicant_origin = Instant::now();
            false
        });
        if fails {
            return unavailable("wpa_supplicant exited with 255");
        }
        Ok(())
    }

    async fn supplicant_command(
        &self,
        _iface: &str,
        command: SupplicantCommand,
    ) -> PlatformResult<()> {
        self.record(format!("supplicant_command:{}", command.as_str()));
        self.with(|s| {
            if !s.supplicant_running {
                return unavailable("Failed to connect to non-global ctrl_ifname");
            }
            match command {
                SupplicantCommand::Reconfigure => {}
                SupplicantCommand::Disconnect => s.supplicant_idle = true,
                SupplicantCommand::Reconnect => {
                    s.supplicant_idle = false;
                    s.supplicant_origin = Instant::now();
                    s.supplicant_script = vec![(Duration::ZERO, s.reconnect_state.clone())];
                }
            }
            Ok(())
        })
    }

    async fn supplicant_status(&self, _iface: &str) -> PlatformResult<String> {
        self.record("supplicant_status");
        self.with(|s| {
            if !s.supplicant_running {
                return unavailable("Failed to connect to non-global ctrl_ifname");
            }
            let state = Self::scripted_state(s);
            let mut status = format!("bssid=00:11:22:33:44:55\nwpa_state={}\n", state);
            if state == "COMPLETED" {
                if let Some(ssid) = &s.associated_ssid {
                    status.push_str(&format!("ssid={}\n", ssid));
                }
            }
            Ok(status)
        })
    }

    async fn supplicant_running(&self, _iface: &str) -> bool {
        self.record("supplicant_running");
        self.with(|s| s.supplicant_running)
    }

    async fn current_ssid(&self, _iface: &str) -> Option<String> {
        self.record("current_ssid");
        self.with(|s| {
            if s.supplicant_running && Self::scripted_state(s) == "COMPLETED" {
                s.associated_ssid.clone()
            } else {
                None
            }
        })
    }

    async fn scan_ssids(&self, _iface: &str) -> PlatformResult<Vec<String>> {
        self.record("scan_ssids");
        Ok(self.with(|s| s.visible_ssids.clone()))
    }

    async fn start_dhcp_client(&self, _iface: &str) -> PlatformResult<()> {
        self.record("start_dhcp_client");
        self.with(|s| {
            s.dhcp_running = true;
            s.addresses = s.dhcp_addresses.clone();
        });
        Ok(())
    }

    async fn dhcp_client_running(&self, _iface: &str) -> bool {
        self.record("dhcp_client_running");
        self.with(|s| s.dhcp_running)
    }

    async fn restart_dhcp_service(&self) -> PlatformResult<()> {
        self.record("restart_dhcp_service");
        self.with(|s| {
            s.dhcp_running = true;
            s.addresses = s.dhcp_addresses.clone();
        });
        Ok(())
    }

    async fn release_dhcp_lease(&self, _iface: &str) -> PlatformResult<()> {
        self.record("release_dhcp_lease");
        self.with(|s| s.addresses.clear());
        Ok(())
    }

    async fn request_fresh_lease(&self, _iface: &str) -> PlatformResult<()> {
        self.record("request_fresh_lease");
        self.with(|s| s.addresses = s.dhcp_addresses.clone());
        Ok(())
    }

    async fn start_access_point(&self) -> PlatformResult<()> {
        self.record("start_access_point");
        self.with(|s| {
            if s.ap_start_fails {
                return unavailable("hostapd: Job for hostapd.service failed");
            }
            s.ap_active = s.ap_becomes_active;
            Ok(())
        })
    }

    async fn stop_access_point(&self) -> PlatformResult<()> {
        self.record("stop_access_point");
        self.with(|s| s.ap_active = false);
        Ok(())
    }

    async fn access_point_active(&self) -> bool {
        self.record("access_point_active");
        self.with(|s| s.ap_active)
    }

    async fn wiphy_info(&self) -> PlatformResult<String> {
        self.record("wiphy_info");
        let concurrent = self.with(|s| s.concurrent);
        let mut report = String::from(
            "Wiphy phy0\n\tSupported interface modes:\n\t\t * managed\n\t\t * AP\n\t\t * monitor\n",
        );
        if concurrent {
            report.push_str("\tvalid interface combinations:\n");
            report.push_str("\t\t * #{ managed } <= 1, #{ AP } <= 1,\n");
            report.push_str("\t\t   total <= 2, #channels <= 1\n\n");
        }
        Ok(report)
    }

    async fn kill_scoped(&self, daemon: ManagedDaemon, _iface: &str) {
        self.record(format!("kill:{}", daemon.program()));
        self.with(|s| match daemon {
            ManagedDaemon::DhcpClient => s.dhcp_running = false,
            ManagedDaemon::Supplicant => {
                s.supplicant_running = false;
                s.supplicant_idle = false;
            }
        });
    }

    async fn restart_mdns(&self) -> PlatformResult<()> {
        self.record("restart_mdns");
        Ok(())
    }

    async fn mdns_active(&self) -> bool {
        self.record("mdns_active");
        true
    }

    async fn notify_ready(&self) -> PlatformResult<()> {
        self.record("notify_ready");
        Ok(())
    }

    async fn trigger_ip_changed(&self, _iface: &str) -> PlatformResult<()> {
        self.record("trigger_ip_changed");
        Ok(())
    }

    async fn regdomain(&self, _iface: &str) -> PlatformResult<String> {
        self.record("regdomain");
        Ok(self.with(|s| s.regdomain.clone()))
    }

    async fn beacon_countries(&self, _iface: &str) -> PlatformResult<Vec<String>> {
        self.record("beacon_countries");
        Ok(self.with(|s| s.beacon_countries.clone()))
    }

    async fn set_regdomain(&self, _iface: &str, code: &str) -> PlatformResult<()> {
        self.record(format!("set_regdomain:{}", code));
        self.with(|s| s.regdomain = code.to_string());
        Ok(())
    }
}

/// Let spawned follow-up tasks run to completion on the paused clock
pub async fn drain(duration: Duration) {
    tokio::time::sleep(duration).await;
}
