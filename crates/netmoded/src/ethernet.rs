//! Ethernet Watcher
//!
//! Tracks the wired interface's carrier. The carrier is read at startup and
//! again whenever the wired status cache file changes. The cache is written
//! only on an actual transition, so the watcher's own write produces one
//! extra event that finds no change.
//!
//! In single network mode a transition re-enters the Arbitrator:
//! - connected: release the WiFi lease, then a full run (scan mode)
//! - disconnected: nothing if WiFi is associated, else a lightweight reconnect
//!
//! Both are spawned as separate tasks, never run inside the event handler.

use crate::arbitrator::Arbitrator;
use anyhow::{Context, Result};
use netmode_common::WiredStatus;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Observed wired transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: WiredStatus,
    pub to: WiredStatus,
    /// Follow-up scheduled on the Arbitrator
    pub action: TransitionAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionAction {
    None,
    /// Full arbitration run into scan mode
    Rearbitrate,
    /// Lightweight WiFi reconnect
    Reconnect,
    /// WiFi already associated
    AlreadyConnected,
}

#[derive(Clone)]
pub struct EthernetWatcher {
    arbitrator: Arbitrator,
}

impl EthernetWatcher {
    pub fn new(arbitrator: Arbitrator) -> Self {
        Self { arbitrator }
    }

    fn status_file(&self) -> PathBuf {
        self.arbitrator.paths().eth_status.clone()
    }

    /// Seed the cache, take the startup reading and watch for changes
    ///
    /// The returned handle owns the file watcher; dropping the task stops it.
    pub async fn start(&self) -> Result<JoinHandle<()>> {
        if let Err(e) = self.arbitrator.publisher().ensure_wired_status() {
            warn!("Could not seed wired status cache: {}", e);
        }
        self.check(true).await;

        let status_file = self.status_file();
        let (tx, mut rx) = mpsc::channel::<()>(16);
        let watcher = watch_file(&status_file, tx)?;
        info!("Watching {} for wired link changes", status_file.display());

        let this = self.clone();
        Ok(tokio::spawn(async move {
            let _watcher = watcher;
            while rx.recv().await.is_some() {
                // Collapse bursts into one check
                while rx.try_recv().is_ok() {}
                this.check(false).await;
            }
            debug!("Wired status watch ended");
        }))
    }

    /// Compare the carrier with the last known state and act on a change
    pub async fn check(&self, first_start: bool) -> Option<Transition> {
        let wired = &self.arbitrator.interfaces().wired;
        let actual = if self.arbitrator.inspector().carrier(wired) {
            WiredStatus::Connected
        } else {
            WiredStatus::Disconnected
        };

        let (previous, single_network_mode) = {
            let mut ctx = self
                .arbitrator
                .context()
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            let previous = ctx.wired_status;
            if previous == actual {
                debug!("checkWiredNetworkStatus: no change ({})", actual);
                return None;
            }
            ctx.wired_status = actual;
            ctx.wired_active = actual.is_connected();
            ctx.transition_started = Some(Instant::now());
            (previous, ctx.single_network_mode)
        };

        if let Err(e) = self.arbitrator.publisher().write_wired_status(actual) {
            debug!("Could not update wired status cache: {}", e);
        }

        info!("=== SNM TRANSITION ===");
        info!("Previous ethernet state: {}", previous);
        info!("New ethernet state: {}", actual);
        info!(
            "Single Network Mode: {}",
            if single_network_mode { "enabled" } else { "disabled" }
        );
        info!("First start: {}", if first_start { "yes" } else { "no" });
        match actual {
            WiredStatus::Connected => info!("Action: Switch to ethernet (WiFi scan mode)"),
            WiredStatus::Disconnected => info!("Action: Reconnect WiFi"),
        }
        info!("=== END TRANSITION ===");

        let action = if first_start || !single_network_mode {
            TransitionAction::None
        } else {
            match actual {
                WiredStatus::Connected => self.on_connected().await,
                WiredStatus::Disconnected => self.on_disconnected().await,
            }
        };

        Some(Transition {
            from: previous,
            to: actual,
            action,
        })
    }

    async fn on_connected(&self) -> TransitionAction {
        let platform = self.arbitrator.platform();
        let wlan = &self.arbitrator.interfaces().wlan;

        info!("SNM: Ethernet connected, switching to ethernet (WiFi scan mode)");
        match platform.release_dhcp_lease(wlan).await {
            Ok(()) => debug!("SNM: {} DHCP lease released successfully", wlan),
            Err(e) => debug!("SNM: DHCP release skipped (no active lease): {}", e),
        }

        let arbitrator = self.arbitrator.clone();
        tokio::spawn(async move {
            arbitrator.run().await;
        });
        TransitionAction::Rearbitrate
    }

    async fn on_disconnected(&self) -> TransitionAction {
        let platform = self.arbitrator.platform();
        let wlan = &self.arbitrator.interfaces().wlan;

        if let Some(ssid) = platform.current_ssid(wlan).await {
            info!("SNM: WiFi already connected to: {}", ssid);
            return TransitionAction::AlreadyConnected;
        }

        let arbitrator = self.arbitrator.clone();
        tokio::spawn(async move {
            arbitrator.reconnect().await;
        });
        TransitionAction::Reconnect
    }
}

/// Watch the parent directory: the file may be replaced, not just written
fn watch_file(path: &Path, tx: mpsc::Sender<()>) -> Result<RecommendedWatcher> {
    let target = path.to_path_buf();
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if event.kind.is_access() {
                return;
            }
            if event.paths.iter().any(|p| p == &target) {
                let _ = tx.try_send(());
            }
        }
        Err(e) => warn!("Wired status watch error: {}", e),
    })
    .context("Failed to create file watcher")?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", dir.display()))?;
    Ok(watcher)
}
