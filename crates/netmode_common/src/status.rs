//! Network State Publisher.
//!
//! The published decision is the only machine-readable outcome of an
//! arbitration run. Two files carry it:
//! - the WiFi status file: `connected` | `hotspot` | `disconnected`
//! - the decision file: `ap` | `hotspot` | `offline`, whose mtime is bumped
//!   after every write so watchers notice repeated identical decisions
//!
//! Both are replaced atomically so readers never see a torn or mixed state.

use crate::error::{CommonError, CommonResult};
use crate::paths::DaemonPaths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Scan-mode indicator value
pub const SCAN_MODE: &str = "scan_mode";

/// Terminal outcome of an arbitration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkDecision {
    /// Joined an existing network as a client
    Ap,
    /// Serving our own access point
    Hotspot,
    /// No WiFi connectivity
    Offline,
}

impl NetworkDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkDecision::Ap => "ap",
            NetworkDecision::Hotspot => "hotspot",
            NetworkDecision::Offline => "offline",
        }
    }

    /// Value of the WiFi status file
    pub fn wlan_status(&self) -> &'static str {
        match self {
            NetworkDecision::Ap => "connected",
            NetworkDecision::Hotspot => "hotspot",
            NetworkDecision::Offline => "disconnected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "ap" => Some(NetworkDecision::Ap),
            "hotspot" => Some(NetworkDecision::Hotspot),
            "offline" => Some(NetworkDecision::Offline),
            _ => None,
        }
    }
}

impl std::fmt::Display for NetworkDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wired link carrier state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WiredStatus {
    Connected,
    Disconnected,
}

impl WiredStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WiredStatus::Connected => "connected",
            WiredStatus::Disconnected => "disconnected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "connected" => Some(WiredStatus::Connected),
            "disconnected" => Some(WiredStatus::Disconnected),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, WiredStatus::Connected)
    }
}

impl std::fmt::Display for WiredStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of the last publication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedStatus {
    pub decision: NetworkDecision,
    pub scan_mode: bool,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct StatusPublisher {
    paths: DaemonPaths,
    last: Mutex<Option<PublishedStatus>>,
}

impl StatusPublisher {
    pub fn new(paths: DaemonPaths) -> Self {
        Self {
            paths,
            last: Mutex::new(None),
        }
    }

    /// Publish a terminal decision
    ///
    /// Write failures are logged and swallowed; publication never fails the
    /// caller. The scan-mode indicator is written in scan mode and removed
    /// otherwise.
    pub fn publish(&self, decision: NetworkDecision, scan_mode: bool) -> PublishedStatus {
        info!(
            "Publishing network state: {}{}",
            decision,
            if scan_mode { " (scan mode)" } else { "" }
        );

        if let Err(e) = write_atomic(&self.paths.wlan_status, decision.wlan_status()) {
            warn!("Could not write WiFi status: {}", e);
        }

        if scan_mode {
            if let Err(e) = write_atomic(&self.paths.snm_status, SCAN_MODE) {
                warn!("Could not write single network mode status: {}", e);
            }
        } else if self.paths.snm_status.exists() {
            if let Err(e) = fs::remove_file(&self.paths.snm_status) {
                debug!("Could not clear single network mode status: {}", e);
            }
        }

        if let Err(e) = write_atomic(&self.paths.network_status, &format!("{}\n", decision)) {
            warn!("Could not write network status: {}", e);
        }
        if let Err(e) = touch(&self.paths.network_status) {
            debug!("Could not refresh network status timestamp: {}", e);
        }

        let status = PublishedStatus {
            decision,
            scan_mode,
            published_at: Utc::now(),
        };
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(status.clone());
        status
    }

    /// Last decision published by this process
    pub fn last(&self) -> Option<PublishedStatus> {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Decision currently on disk, whoever wrote it
    pub fn read_decision(&self) -> Option<NetworkDecision> {
        fs::read_to_string(&self.paths.network_status)
            .ok()
            .and_then(|s| NetworkDecision::parse(&s))
    }

    pub fn read_wired_status(&self) -> Option<WiredStatus> {
        fs::read_to_string(&self.paths.eth_status)
            .ok()
            .and_then(|s| WiredStatus::parse(&s))
    }

    /// Rewrite the wired status cache in place
    ///
    /// Written in place rather than renamed: the Ethernet Watcher watches
    /// this file and callers only write on actual transitions.
    pub fn write_wired_status(&self, status: WiredStatus) -> CommonResult<()> {
        let path = &self.paths.eth_status;
        ensure_parent(path)?;
        fs::write(path, status.as_str()).map_err(|e| CommonError::io(path, e))
    }

    /// Seed the wired status cache with `disconnected` if absent
    pub fn ensure_wired_status(&self) -> CommonResult<()> {
        if self.paths.eth_status.exists() {
            return Ok(());
        }
        self.write_wired_status(WiredStatus::Disconnected)
    }
}

fn ensure_parent(path: &Path) -> CommonResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CommonError::io(parent, e))?;
    }
    Ok(())
}

/// Write via a sibling temp file and rename over the target
pub fn write_atomic(path: &Path, content: &str) -> CommonResult<()> {
    ensure_parent(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));
    fs::write(&temp_path, content).map_err(|e| CommonError::io(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| CommonError::io(path, e))
}

fn touch(path: &Path) -> CommonResult<()> {
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| CommonError::io(path, e))?;
    file.set_modified(SystemTime::now())
        .map_err(|e| CommonError::io(path, e))
}
