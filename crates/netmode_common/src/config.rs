//! Configuration gateway.
//!
//! Network settings live in a JSON document written by the network plugin:
//!
//! ```json
//! { "wireless_enabled": { "type": "boolean", "value": true },
//!   "wlanssid": { "type": "string", "value": "Home" } }
//! ```
//!
//! The document is re-read on every query because the UI may rewrite it
//! while a flow is running. On first boot the runtime document does not
//! exist yet and the packaged defaults are used instead.

use crate::error::{CommonError, CommonResult};
use crate::paths::DaemonPaths;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// A single `{ "type": ..., "value": ... }` entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Setting {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Setting {
    pub fn new(value: impl Into<serde_json::Value>) -> Self {
        Self {
            kind: None,
            value: value.into(),
        }
    }

    /// Boolean value, accepting the string forms the UI sometimes writes
    pub fn as_bool(&self) -> Option<bool> {
        match &self.value {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::String(s) => match s.trim() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}

/// Network settings relevant to arbitration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wireless_enabled: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_hotspot: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotspot_fallback: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wlanssid: Option<Setting>,
}

impl NetworkConfig {
    pub fn load(path: &Path) -> CommonResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| CommonError::io(path, e))?;
        serde_json::from_str(&content).map_err(|source| CommonError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Wireless is disabled only when explicitly set to false
    pub fn wireless_enabled(&self) -> bool {
        !matches!(flag(&self.wireless_enabled), Some(false))
    }

    /// Hotspot is disabled only when explicitly set to false
    pub fn hotspot_enabled(&self) -> bool {
        !matches!(flag(&self.enable_hotspot), Some(false))
    }

    pub fn hotspot_fallback(&self) -> bool {
        matches!(flag(&self.hotspot_fallback), Some(true))
    }

    pub fn network_name(&self) -> Option<String> {
        self.wlanssid
            .as_ref()
            .and_then(|s| s.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

fn flag(setting: &Option<Setting>) -> Option<bool> {
    setting.as_ref().and_then(Setting::as_bool)
}

/// Read-only access to the network settings
#[derive(Debug, Clone)]
pub struct ConfigGateway {
    paths: DaemonPaths,
}

impl ConfigGateway {
    pub fn new(paths: DaemonPaths) -> Self {
        Self { paths }
    }

    /// Runtime settings, falling back to packaged defaults, then built-ins
    pub fn load(&self) -> NetworkConfig {
        match NetworkConfig::load(&self.paths.network_config) {
            Ok(conf) => conf,
            Err(e) => {
                debug!("First boot, using packaged network defaults ({})", e);
                NetworkConfig::load(&self.paths.default_network_config).unwrap_or_else(|e| {
                    debug!("Packaged network defaults unavailable: {}", e);
                    NetworkConfig::default()
                })
            }
        }
    }

    pub fn wireless_enabled(&self) -> bool {
        self.load().wireless_enabled()
    }

    pub fn hotspot_enabled(&self) -> bool {
        self.load().hotspot_enabled()
    }

    pub fn hotspot_fallback_on_failure(&self) -> bool {
        self.load().hotspot_fallback()
    }

    pub fn configured_network_name(&self) -> Option<String> {
        self.load().network_name()
    }
}

/// Parameters read from the `KEY=value` environment file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvParameters {
    /// Only one of ethernet/WiFi carries traffic at a time
    pub single_network_mode: bool,
    /// Verbose diagnostic logging
    pub debug: bool,
}

impl Default for EnvParameters {
    fn default() -> Self {
        Self {
            single_network_mode: true,
            debug: false,
        }
    }
}

impl EnvParameters {
    /// Missing or unreadable files yield the production defaults
    pub fn load(path: &Path) -> Self {
        fs::read_to_string(path)
            .map(|content| Self::parse(&content))
            .unwrap_or_default()
    }

    pub fn parse(content: &str) -> Self {
        let mut params = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            match key.trim() {
                "SINGLE_NETWORK_MODE" => params.single_network_mode = value != "false",
                "DEBUG_WIRELESS" => params.debug = value == "true",
                _ => {}
            }
        }
        params
    }
}

/// Supplicant driver list for the running hardware
///
/// Some boards only work with the legacy wireless extensions driver.
pub fn supplicant_driver(os_release: &Path) -> &'static str {
    let hardware = fs::read_to_string(os_release)
        .ok()
        .and_then(|content| {
            content.lines().find_map(|line| {
                line.strip_prefix("VOLUMIO_HARDWARE=")
                    .map(|v| v.trim().trim_matches('"').to_string())
            })
        })
        .unwrap_or_default();

    if hardware == "nanopineo2" {
        "wext"
    } else {
        "nl80211,wext"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_missing_documents_use_builtin_defaults() {
        let temp = TempDir::new().unwrap();
        let gateway = ConfigGateway::new(DaemonPaths::with_root(temp.path()));

        assert!(gateway.wireless_enabled());
        assert!(gateway.hotspot_enabled());
        assert!(!gateway.hotspot_fallback_on_failure());
        assert_eq!(gateway.configured_network_name(), None);
    }

    #[test]
    fn test_packaged_defaults_used_on_first_boot() {
        let temp = TempDir::new().unwrap();
        let paths = DaemonPaths::with_root(temp.path());
        write(
            &paths.default_network_config,
            r#"{"enable_hotspot": {"type": "boolean", "value": false}}"#,
        );

        let gateway = ConfigGateway::new(paths);
        assert!(!gateway.hotspot_enabled());
    }

    #[test]
    fn test_runtime_document_wins() {
        let temp = TempDir::new().unwrap();
        let paths = DaemonPaths::with_root(temp.path());
        write(
            &paths.default_network_config,
            r#"{"wireless_enabled": {"value": true}}"#,
        );
        write(
            &paths.network_config,
            r#"{
                "wireless_enabled": {"type": "boolean", "value": false},
                "hotspot_fallback": {"type": "boolean", "value": "true"},
                "wlanssid": {"type": "string", "value": "  Home  "}
            }"#,
        );

        let gateway = ConfigGateway::new(paths);
        assert!(!gateway.wireless_enabled());
        assert!(gateway.hotspot_fallback_on_failure());
        assert_eq!(gateway.configured_network_name().as_deref(), Some("Home"));
    }

    #[test]
    fn test_empty_ssid_is_none() {
        let conf: NetworkConfig =
            serde_json::from_str(r#"{"wlanssid": {"value": ""}}"#).unwrap();
        assert_eq!(conf.network_name(), None);
    }

    #[test]
    fn test_env_parameters() {
        assert_eq!(EnvParameters::parse(""), EnvParameters::default());

        let params = EnvParameters::parse("SINGLE_NETWORK_MODE=false\nDEBUG_WIRELESS=true\n");
        assert!(!params.single_network_mode);
        assert!(params.debug);

        let params =
            EnvParameters::parse("# SINGLE_NETWORK_MODE=false\nSINGLE_NETWORK_MODE=\"true\"");
        assert!(params.single_network_mode);
    }

    #[test]
    fn test_supplicant_driver() {
        let temp = TempDir::new().unwrap();
        let release = temp.path().join("os-release");

        assert_eq!(supplicant_driver(&release), "nl80211,wext");

        write(&release, "NAME=\"Linux\"\nVOLUMIO_HARDWARE=\"nanopineo2\"\n");
        assert_eq!(supplicant_driver(&release), "wext");

        write(&release, "VOLUMIO_HARDWARE=\"pi\"\n");
        assert_eq!(supplicant_driver(&release), "nl80211,wext");
    }
}
