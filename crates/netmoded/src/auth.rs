//! Authentication State Machine
//!
//! Observes the supplicant's own protocol state by polling its status and
//! times out on each phase separately, so a failing attempt is classified
//! within seconds and with a cause:
//!
//! | state              | timeout | failure            |
//! |--------------------|---------|--------------------|
//! | SCANNING           | 15s     | SCAN_FAILED        |
//! | AUTHENTICATING     | 10s     | AUTH_FAILED        |
//! | ASSOCIATING        | 10s     | ASSOC_FAILED       |
//! | 4WAY_HANDSHAKE     | 10s     | HANDSHAKE_FAILED   |
//! | INTERFACE_DISABLED | 5s      | INTERFACE_DISABLED |
//!
//! DISCONNECTED is the normal state between attempts and never times out.
//! The whole session is bounded by the monitoring window (TIMEOUT) and an
//! unreachable supplicant ends it at once (ERROR).

use crate::platform::parse::status_field;
use crate::platform::Platform;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupplicantState {
    Disconnected,
    InterfaceDisabled,
    Inactive,
    Scanning,
    Authenticating,
    Associating,
    Associated,
    FourWayHandshake,
    GroupHandshake,
    Completed,
    Other(String),
}

impl SupplicantState {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "DISCONNECTED" => SupplicantState::Disconnected,
            "INTERFACE_DISABLED" => SupplicantState::InterfaceDisabled,
            "INACTIVE" => SupplicantState::Inactive,
            "SCANNING" => SupplicantState::Scanning,
            "AUTHENTICATING" => SupplicantState::Authenticating,
            "ASSOCIATING" => SupplicantState::Associating,
            "ASSOCIATED" => SupplicantState::Associated,
            "4WAY_HANDSHAKE" => SupplicantState::FourWayHandshake,
            "GROUP_HANDSHAKE" => SupplicantState::GroupHandshake,
            "COMPLETED" => SupplicantState::Completed,
            other => SupplicantState::Other(other.to_string()),
        }
    }

    /// State from a raw status report
    pub fn from_status(status: &str) -> Option<Self> {
        status_field(status, "wpa_state").map(Self::parse)
    }

    pub fn as_str(&self) -> &str {
        match self {
            SupplicantState::Disconnected => "DISCONNECTED",
            SupplicantState::InterfaceDisabled => "INTERFACE_DISABLED",
            SupplicantState::Inactive => "INACTIVE",
            SupplicantState::Scanning => "SCANNING",
            SupplicantState::Authenticating => "AUTHENTICATING",
            SupplicantState::Associating => "ASSOCIATING",
            SupplicantState::Associated => "ASSOCIATED",
            SupplicantState::FourWayHandshake => "4WAY_HANDSHAKE",
            SupplicantState::GroupHandshake => "GROUP_HANDSHAKE",
            SupplicantState::Completed => "COMPLETED",
            SupplicantState::Other(s) => s,
        }
    }

    /// Idle and scan-capable, not associated
    pub fn is_idle(&self) -> bool {
        matches!(self, SupplicantState::Disconnected | SupplicantState::Inactive)
    }
}

impl fmt::Display for SupplicantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified cause of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    InterfaceDisabled,
    ScanFailed,
    AuthFailed,
    AssocFailed,
    HandshakeFailed,
    Timeout,
    Error,
}

impl AuthFailure {
    pub fn code(&self) -> &'static str {
        match self {
            AuthFailure::InterfaceDisabled => "INTERFACE_DISABLED",
            AuthFailure::ScanFailed => "SCAN_FAILED",
            AuthFailure::AuthFailed => "AUTH_FAILED",
            AuthFailure::AssocFailed => "ASSOC_FAILED",
            AuthFailure::HandshakeFailed => "HANDSHAKE_FAILED",
            AuthFailure::Timeout => "TIMEOUT",
            AuthFailure::Error => "ERROR",
        }
    }

    pub fn explanation(&self) -> &'static str {
        match self {
            AuthFailure::InterfaceDisabled => {
                "WiFi interface disabled - possible hardware or driver issue"
            }
            AuthFailure::ScanFailed => "Network not found - check SSID and signal strength",
            AuthFailure::AuthFailed => "Authentication failed - check network configuration",
            AuthFailure::AssocFailed => "Association failed - AP may be rejecting connection",
            AuthFailure::HandshakeFailed => "Wrong password or security configuration mismatch",
            AuthFailure::Timeout => "Connection attempt timed out",
            AuthFailure::Error => "wpa_supplicant error or crash",
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StateTimeouts {
    pub scanning: Duration,
    pub authenticating: Duration,
    pub associating: Duration,
    pub four_way_handshake: Duration,
    pub interface_disabled: Duration,
}

impl Default for StateTimeouts {
    fn default() -> Self {
        Self {
            scanning: Duration::from_secs(15),
            authenticating: Duration::from_secs(10),
            associating: Duration::from_secs(10),
            four_way_handshake: Duration::from_secs(10),
            interface_disabled: Duration::from_secs(5),
        }
    }
}

impl StateTimeouts {
    /// Timeout policy for a newly entered state
    pub fn for_state(&self, state: &SupplicantState) -> Option<StateDeadline> {
        let (after, failure, detail) = match state {
            SupplicantState::Scanning => (
                self.scanning,
                AuthFailure::ScanFailed,
                "Network not found after scanning",
            ),
            SupplicantState::Authenticating => (
                self.authenticating,
                AuthFailure::AuthFailed,
                "Authentication timeout - check password",
            ),
            SupplicantState::Associating => (
                self.associating,
                AuthFailure::AssocFailed,
                "Association timeout",
            ),
            SupplicantState::FourWayHandshake => (
                self.four_way_handshake,
                AuthFailure::HandshakeFailed,
                "Wrong password or PSK mismatch",
            ),
            SupplicantState::InterfaceDisabled => (
                self.interface_disabled,
                AuthFailure::InterfaceDisabled,
                "Interface disabled - possible rename race or driver issue",
            ),
            _ => return None,
        };
        Some(StateDeadline {
            at: Instant::now() + after,
            failure,
            detail,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateDeadline {
    pub at: Instant,
    pub failure: AuthFailure,
    pub detail: &'static str,
}

/// Terminal result of one `monitor` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Connected { ssid: String },
    Failed { failure: AuthFailure, detail: String },
    /// Ended by `stop()`
    Stopped,
}

impl AuthOutcome {
    fn failed(failure: AuthFailure, detail: impl Into<String>) -> Self {
        AuthOutcome::Failed {
            failure,
            detail: detail.into(),
        }
    }
}

/// Observation state of one connection attempt
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub current: Option<SupplicantState>,
    pub previous: Option<SupplicantState>,
    pub entered_at: Instant,
    pub consecutive_failures: u32,
    pub deadline: Option<StateDeadline>,
}

impl AuthSession {
    fn new() -> Self {
        Self {
            current: None,
            previous: None,
            entered_at: Instant::now(),
            consecutive_failures: 0,
            deadline: None,
        }
    }

    /// Record a state change; the previous state's timer is always dropped
    fn transition(&mut self, next: SupplicantState, timeouts: &StateTimeouts) {
        let duration = self
            .current
            .as_ref()
            .map(|_| self.entered_at.elapsed().as_millis())
            .unwrap_or(0);
        info!(
            "WpaStateMachine: State transition: {} -> {} (duration: {}ms)",
            self.current.as_ref().map(|s| s.as_str()).unwrap_or("NULL"),
            next,
            duration
        );

        self.previous = self.current.take();
        self.entered_at = Instant::now();
        self.deadline = timeouts.for_state(&next);

        match &next {
            SupplicantState::InterfaceDisabled => {
                info!("WpaStateMachine: INTERFACE_DISABLED detected - interface or driver issue");
                self.consecutive_failures += 1;
            }
            SupplicantState::Disconnected => {
                debug!("WpaStateMachine: DISCONNECTED - not associated");
                self.consecutive_failures += 1;
            }
            SupplicantState::Completed => self.consecutive_failures = 0,
            other => debug!("WpaStateMachine: {}", other),
        }

        self.current = Some(next);
    }
}

pub struct AuthMonitor {
    platform: Arc<dyn Platform>,
    timeouts: StateTimeouts,
    poll_interval: Duration,
    window: Duration,
    stop: Notify,
    last_session: Mutex<Option<AuthSession>>,
}

impl AuthMonitor {
    pub fn new(
        platform: Arc<dyn Platform>,
        timeouts: StateTimeouts,
        poll_interval: Duration,
        window: Duration,
    ) -> Self {
        Self {
            platform,
            timeouts,
            poll_interval,
            window,
            stop: Notify::new(),
            last_session: Mutex::new(None),
        }
    }

    /// Observe one connection attempt until it reaches a terminal outcome
    ///
    /// Every exit path drops the session's timers together with the session.
    pub async fn monitor(&self, iface: &str) -> AuthOutcome {
        info!("WpaStateMachine: Starting state monitor for {}", iface);

        let stopped = self.stop.notified();
        tokio::pin!(stopped);
        stopped.as_mut().enable();

        let window_end = Instant::now() + self.window;
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut session = AuthSession::new();

        let outcome = loop {
            let state_deadline = session.deadline;

            tokio::select! {
                biased;

                _ = &mut stopped => {
                    debug!("WpaStateMachine: State monitor stopped");
                    break AuthOutcome::Stopped;
                }

                _ = sleep_until_opt(state_deadline.map(|d| d.at)) => {
                    // select only polls this branch when a deadline is set
                    let Some(deadline) = state_deadline else { continue };
                    let state = session.current.as_ref().map(|s| s.to_string()).unwrap_or_default();
                    info!("WpaStateMachine: {} timeout - {}", state, deadline.detail);
                    if deadline.failure != AuthFailure::InterfaceDisabled {
                        session.consecutive_failures += 1;
                    }
                    break AuthOutcome::failed(deadline.failure, deadline.detail);
                }

                _ = tokio::time::sleep_until(window_end) => {
                    info!("WpaStateMachine: Max monitoring duration reached, stopping");
                    break AuthOutcome::failed(AuthFailure::Timeout, "monitoring window elapsed");
                }

                _ = ticker.tick() => {
                    let status = match self.platform.supplicant_status(iface).await {
                        Ok(status) => status,
                        Err(e) => {
                            debug!("WpaStateMachine: State poll error: {}", e);
                            break AuthOutcome::failed(
                                AuthFailure::Error,
                                "wpa_supplicant not responding",
                            );
                        }
                    };

                    let Some(state) = SupplicantState::from_status(&status) else {
                        continue;
                    };
                    if session.current.as_ref() == Some(&state) {
                        continue;
                    }
                    session.transition(state, &self.timeouts);

                    if session.current == Some(SupplicantState::Completed) {
                        let ssid = status_field(&status, "ssid").unwrap_or("unknown").to_string();
                        info!("WpaStateMachine: COMPLETED - connection successful");
                        break AuthOutcome::Connected { ssid };
                    }
                }
            }
        };

        session.deadline = None;
        *self.last_session.lock().unwrap_or_else(|e| e.into_inner()) = Some(session);
        outcome
    }

    /// End the running `monitor` call, if any
    pub fn stop(&self) {
        self.stop.notify_waiters();
    }

    /// Session of the most recent `monitor` call
    pub fn last_session(&self) -> Option<AuthSession> {
        self.last_session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
