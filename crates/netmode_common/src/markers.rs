//! One-shot and persistent marker files.
//!
//! Markers are presence-only files. Their content is never read.

use crate::error::{CommonError, CommonResult};
use crate::paths::DaemonPaths;
use std::fs;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Markers {
    paths: DaemonPaths,
}

impl Markers {
    pub fn new(paths: DaemonPaths) -> Self {
        Self { paths }
    }

    /// Consume the force-hotspot trigger
    ///
    /// Returns true at most once per trigger: the file is deleted on read.
    pub fn take_force_hotspot(&self) -> bool {
        let path = &self.paths.force_hotspot;
        if !path.exists() {
            return false;
        }
        if let Err(e) = fs::remove_file(path) {
            warn!("Could not consume {}: {}", path.display(), e);
        }
        true
    }

    /// Network setup has been completed at least once
    ///
    /// Written by the installer, never by the daemon.
    pub fn network_configured(&self) -> bool {
        self.paths.net_configured.exists()
    }

    /// A client connection has succeeded at least once
    pub fn ever_connected(&self) -> bool {
        self.paths.wireless_established.exists()
    }

    pub fn record_connected(&self) -> CommonResult<()> {
        let path = &self.paths.wireless_established;
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CommonError::io(parent, e))?;
        }
        fs::write(path, b"").map_err(|e| CommonError::io(path, e))?;
        debug!("Recorded first successful wireless connection");
        Ok(())
    }
}
