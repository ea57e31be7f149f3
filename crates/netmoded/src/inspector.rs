//! Interface Inspector - physical interface identity and readiness
//!
//! Sources (all under the network device tree, `/sys/class/net`):
//! - `<iface>/address`: hardware address, the identity used to detect
//!   renames racing with daemon startup
//! - `<iface>` symlink target: bus path, contains `usb` for USB adapters
//! - `<iface>/operstate`, `<iface>/carrier`, `<iface>/flags`
//!
//! Every read is best-effort. An OS error means "unavailable" and surfaces
//! as `None` or a not-ready validation, never as an error.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Operational state as reported by the kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperState {
    Up,
    Down,
    Dormant,
    LowerLayerDown,
    /// Driver not (yet) initialized
    Unknown,
    Other(String),
}

impl OperState {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "up" => OperState::Up,
            "down" => OperState::Down,
            "dormant" => OperState::Dormant,
            "lowerlayerdown" => OperState::LowerLayerDown,
            "unknown" => OperState::Unknown,
            other => OperState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OperState::Up => "up",
            OperState::Down => "down",
            OperState::Dormant => "dormant",
            OperState::LowerLayerDown => "lowerlayerdown",
            OperState::Unknown => "unknown",
            OperState::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkState {
    pub oper_state: OperState,
    /// Physical link present
    pub carrier: bool,
    /// Interface flags (IFF_*), when readable
    pub flags: Option<u32>,
}

impl LinkState {
    /// Link down or no carrier: nothing holds the interface
    pub fn is_released(&self) -> bool {
        self.oper_state == OperState::Down || !self.carrier
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub name: String,
    pub hardware_address: String,
    pub bus_path: Option<String>,
    pub is_usb: bool,
    pub oper_state: Option<OperState>,
    /// Address this name carried before its last identity change
    pub previous_hardware_address: Option<String>,
    pub last_observed_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyReason {
    InterfaceNotFound,
    StateUnreadable,
    DriverNotReady,
}

impl NotReadyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotReadyReason::InterfaceNotFound => "interface_not_found",
            NotReadyReason::StateUnreadable => "state_unreadable",
            NotReadyReason::DriverNotReady => "driver_not_ready",
        }
    }
}

impl std::fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a readiness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub ready: bool,
    pub reason: Option<NotReadyReason>,
    pub mac: Option<String>,
    pub is_usb: bool,
    pub oper_state: Option<OperState>,
}

impl Validation {
    fn not_ready(reason: NotReadyReason, mac: Option<String>) -> Self {
        Self {
            ready: false,
            reason: Some(reason),
            mac,
            is_usb: false,
            oper_state: None,
        }
    }

    pub fn reason_str(&self) -> &'static str {
        self.reason.map(|r| r.as_str()).unwrap_or("ready")
    }
}

/// `wait_until_ready` gave up
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "timeout waiting for interface ready after {}ms: {}",
    elapsed.as_millis(),
    last.reason_str()
)]
pub struct ReadinessTimeout {
    pub last: Validation,
    pub elapsed: Duration,
}

pub struct InterfaceInspector {
    root: PathBuf,
    freshness: Duration,
    poll_interval: Duration,
    cache: Mutex<HashMap<String, InterfaceDescriptor>>,
}

impl InterfaceInspector {
    pub fn new(root: impl Into<PathBuf>, freshness: Duration, poll_interval: Duration) -> Self {
        Self {
            root: root.into(),
            freshness,
            poll_interval,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self, name: &str) -> bool {
        self.root.join(name).join("operstate").exists()
    }

    pub fn mac(&self, name: &str) -> Option<String> {
        match fs::read_to_string(self.root.join(name).join("address")) {
            Ok(mac) => Some(mac.trim().to_string()).filter(|m| !m.is_empty()),
            Err(e) => {
                debug!("Inspector: cannot read MAC for {}: {}", name, e);
                None
            }
        }
    }

    /// Target of the device tree link, e.g. `../../devices/platform/.../usb1/...`
    pub fn bus_path(&self, name: &str) -> Option<String> {
        match fs::read_link(self.root.join(name)) {
            Ok(target) => Some(target.to_string_lossy().trim().to_string()),
            Err(e) => {
                debug!("Inspector: cannot read bus path for {}: {}", name, e);
                None
            }
        }
    }

    /// Last component of the `device` link, identifies the chipset binding
    pub fn device_name(&self, name: &str) -> Option<String> {
        fs::read_link(self.root.join(name).join("device"))
            .ok()
            .and_then(|target| target.file_name().map(|n| n.to_string_lossy().to_string()))
    }

    pub fn oper_state(&self, name: &str) -> Option<LinkState> {
        let dir = self.root.join(name);
        let oper_state = match fs::read_to_string(dir.join("operstate")) {
            Ok(s) => OperState::parse(&s),
            Err(e) => {
                debug!("Inspector: cannot read operstate for {}: {}", name, e);
                return None;
            }
        };
        // carrier is unreadable while the interface is administratively down
        let carrier = fs::read_to_string(dir.join("carrier"))
            .map(|s| s.trim() == "1")
            .unwrap_or(false);
        let flags = fs::read_to_string(dir.join("flags"))
            .ok()
            .and_then(|s| u32::from_str_radix(s.trim().trim_start_matches("0x"), 16).ok());

        Some(LinkState {
            oper_state,
            carrier,
            flags,
        })
    }

    /// Hardware link present
    pub fn carrier(&self, name: &str) -> bool {
        fs::read_to_string(self.root.join(name).join("carrier"))
            .map(|s| s.trim() == "1")
            .unwrap_or(false)
    }

    /// Ready iff the device exists and its driver reports a known state
    ///
    /// Always re-reads the device and records the result in the descriptor
    /// cache.
    pub fn validate_ready(&self, name: &str) -> Validation {
        debug!("Inspector: validating {} readiness", name);

        let Some(descriptor) = self.refresh(name) else {
            info!("Inspector: FAIL - {} does not exist", name);
            return Validation::not_ready(NotReadyReason::InterfaceNotFound, None);
        };
        let mac = descriptor.hardware_address;

        let Some(state) = self.oper_state(name) else {
            info!("Inspector: FAIL - cannot read {} state", name);
            return Validation::not_ready(NotReadyReason::StateUnreadable, Some(mac));
        };

        if state.oper_state == OperState::Unknown {
            info!("Inspector: FAIL - {} driver not initialized (operstate=unknown)", name);
            return Validation::not_ready(NotReadyReason::DriverNotReady, Some(mac));
        }

        let is_usb = descriptor.is_usb;
        debug!(
            "Inspector: {} MAC={} operstate={} USB={}",
            name,
            mac,
            state.oper_state.as_str(),
            is_usb
        );
        info!("Inspector: READY - {} is ready for operations", name);

        Validation {
            ready: true,
            reason: None,
            mac: Some(mac),
            is_usb,
            oper_state: Some(state.oper_state),
        }
    }

    /// Poll `validate_ready` until ready or `max_wait` elapses
    pub async fn wait_until_ready(
        &self,
        name: &str,
        max_wait: Duration,
    ) -> Result<Validation, ReadinessTimeout> {
        let started = Instant::now();
        let max_attempts = (max_wait.as_millis() / self.poll_interval.as_millis().max(1)).max(1);
        let mut attempts = 0u128;

        debug!(
            "Inspector: waiting for {} to become ready (max {}ms)",
            name,
            max_wait.as_millis()
        );

        loop {
            attempts += 1;
            let validation = self.validate_ready(name);
            if validation.ready {
                info!(
                    "Inspector: {} became ready after {}ms",
                    name,
                    started.elapsed().as_millis()
                );
                return Ok(validation);
            }
            if attempts >= max_attempts {
                let timeout = ReadinessTimeout {
                    last: validation,
                    elapsed: started.elapsed(),
                };
                info!("Inspector: {} - {}", name, timeout);
                return Err(timeout);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Poll until the interface is released (link down or no carrier)
    ///
    /// Returns false on timeout; callers proceed anyway. A missing interface
    /// counts as not released.
    pub async fn wait_until_released(
        &self,
        name: &str,
        max_wait: Duration,
        step: Duration,
    ) -> bool {
        let started = Instant::now();
        loop {
            if self.oper_state(name).map(|s| s.is_released()).unwrap_or(false) {
                debug!("Inspector: {} is released", name);
                return true;
            }
            if started.elapsed() >= max_wait {
                debug!("Inspector: timeout waiting for {} release", name);
                return false;
            }
            tokio::time::sleep(step).await;
        }
    }

    /// False if the hardware address is gone or differs from `expected_mac`
    ///
    /// Re-reads the device, so a changed or vanished identity also replaces
    /// the cached descriptor.
    pub fn verify_identity(&self, name: &str, expected_mac: &str) -> bool {
        match self.refresh(name) {
            None => {
                info!("Inspector: {} no longer exists", name);
                false
            }
            Some(current) if current.hardware_address != expected_mac => {
                info!(
                    "Inspector: {} identity changed! Was {}, now {}",
                    name, expected_mac, current.hardware_address
                );
                false
            }
            Some(_) => true,
        }
    }

    /// Cached descriptor, refreshed when older than the freshness window
    pub fn descriptor(&self, name: &str) -> Option<InterfaceDescriptor> {
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = cache.get(name) {
                if cached.last_observed_at.elapsed() < self.freshness {
                    return Some(cached.clone());
                }
            }
        }
        self.refresh(name)
    }

    /// Re-read a descriptor, dropping it from the cache if the device is gone
    ///
    /// A changed hardware address replaces the cached entry; the old address
    /// is kept as `previous_hardware_address`.
    pub fn refresh(&self, name: &str) -> Option<InterfaceDescriptor> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let Some(mac) = self.mac(name) else {
            if cache.remove(name).is_some() {
                debug!("Inspector: {} disappeared, dropping cached descriptor", name);
            }
            return None;
        };

        let previous_hardware_address = match cache.get(name) {
            Some(cached) if cached.hardware_address != mac => {
                debug!(
                    "Inspector: {} hardware address changed {} -> {}, invalidating",
                    name, cached.hardware_address, mac
                );
                Some(cached.hardware_address.clone())
            }
            Some(cached) => cached.previous_hardware_address.clone(),
            None => None,
        };

        let bus_path = self.bus_path(name);
        let descriptor = InterfaceDescriptor {
            name: name.to_string(),
            hardware_address: mac,
            is_usb: bus_path.as_deref().map(|p| p.contains("usb")).unwrap_or(false),
            bus_path,
            oper_state: self.oper_state(name).map(|s| s.oper_state),
            previous_hardware_address,
            last_observed_at: Instant::now(),
        };
        cache.insert(name.to_string(), descriptor.clone());
        Some(descriptor)
    }

    /// Name now carried by the adapter that was `original` with `mac`
    ///
    /// Checks the descriptor cache first (subject to the freshness window),
    /// then scans the device tree. A hit is cached under its new name and a
    /// stale `original` entry still carrying `mac` is dropped.
    pub fn detect_rename(&self, original: &str, mac: &str) -> Option<String> {
        let cached = {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache
                .values()
                .find(|d| d.hardware_address == mac && d.name != original)
                .map(|d| d.name.clone())
        };
        let cached = cached.filter(|name| {
            self.descriptor(name)
                .map(|d| d.hardware_address == mac)
                .unwrap_or(false)
        });
        if let Some(name) = &cached {
            debug!("Inspector: rename of {} served from cache: {}", original, name);
        }

        let renamed = cached.or_else(|| {
            let found = fs::read_dir(&self.root).ok().and_then(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .filter(|name| name != original)
                    .find(|name| self.mac(name).as_deref() == Some(mac))
            });
            if let Some(name) = &found {
                self.refresh(name);
            }
            found
        });

        if let Some(name) = &renamed {
            info!(
                "Inspector: detected rename: {} -> {} (MAC: {})",
                original, name, mac
            );
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if cache
                .get(original)
                .is_some_and(|d| d.hardware_address == mac)
            {
                cache.remove(original);
            }
        }
        renamed
    }
}
