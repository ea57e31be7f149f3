//! Process-wide arbitration state and its re-entrancy guards.

use netmode_common::WiredStatus;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Uninitialized,
    ClientConnecting,
    ClientConnected,
    Hotspot,
    Offline,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Uninitialized => "uninitialized",
            Mode::ClientConnecting => "client-connecting",
            Mode::ClientConnected => "client-connected",
            Mode::Hotspot => "hotspot",
            Mode::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArbitrationContext {
    pub mode: Mode,
    /// An arbitration flow (full run or lightweight reconnect) is active
    pub flow_in_progress: bool,
    /// A client-start attempt is active
    pub ap_start_in_progress: bool,
    pub retry_count: u32,
    pub wired_active: bool,
    pub wired_status: WiredStatus,
    pub single_network_mode: bool,
    pub first_boot_established: bool,
    /// Start of the last ethernet transition, for timing diagnostics
    pub transition_started: Option<Instant>,
}

impl ArbitrationContext {
    pub fn new(single_network_mode: bool, first_boot_established: bool) -> Self {
        Self {
            mode: Mode::Uninitialized,
            flow_in_progress: false,
            ap_start_in_progress: false,
            retry_count: 0,
            wired_active: false,
            wired_status: WiredStatus::Disconnected,
            single_network_mode,
            first_boot_established,
            transition_started: None,
        }
    }

    /// Milliseconds since the last ethernet transition, consuming the mark
    pub fn take_transition_elapsed(&mut self) -> Option<u128> {
        self.transition_started
            .take()
            .map(|started| started.elapsed().as_millis())
    }
}

pub type SharedContext = Arc<Mutex<ArbitrationContext>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardKind {
    Flow,
    ClientStart,
}

impl GuardKind {
    fn flag(self, ctx: &mut ArbitrationContext) -> &mut bool {
        match self {
            GuardKind::Flow => &mut ctx.flow_in_progress,
            GuardKind::ClientStart => &mut ctx.ap_start_in_progress,
        }
    }
}

/// Holds one re-entrancy flag; the flag is cleared when the guard drops
///
/// Acquisition never waits: a second request while the flag is set is
/// refused and the caller drops its work.
#[derive(Debug)]
pub struct FlowGuard {
    ctx: SharedContext,
    kind: GuardKind,
}

impl FlowGuard {
    pub fn acquire(ctx: &SharedContext, kind: GuardKind) -> Option<Self> {
        let mut guard = ctx.lock().unwrap_or_else(|e| e.into_inner());
        let flag = kind.flag(&mut guard);
        if *flag {
            return None;
        }
        *flag = true;
        Some(Self {
            ctx: Arc::clone(ctx),
            kind,
        })
    }

    pub fn kind(&self) -> GuardKind {
        self.kind
    }
}

impl Drop for FlowGuard {
    fn drop(&mut self) {
        let mut guard = self.ctx.lock().unwrap_or_else(|e| e.into_inner());
        *self.kind.flag(&mut guard) = false;
        debug!("{:?} guard released", self.kind);
    }
}
