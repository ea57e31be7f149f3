//! Process Controller - starts, stops and queries external network daemons
//!
//! Output of every child is forwarded to the debug log and never parsed
//! here. Detached children are tracked by PID so they can be terminated
//! precisely; pattern matching is only used for processes this daemon did
//! not start (e.g. a supplicant restarted by the service manager).

use crate::error::{PlatformError, PlatformResult};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::fmt;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Program plus arguments, executed without a shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Split a whitespace-separated command line
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).args(parts))
    }

    /// Prefix with the privilege wrapper, if one is configured
    pub fn privileged(self, wrapper: Option<&str>) -> Self {
        match wrapper {
            Some(wrapper) => {
                let mut args = Vec::with_capacity(self.args.len() + 1);
                args.push(self.program);
                args.extend(self.args);
                Self {
                    program: wrapper.to_string(),
                    args,
                }
            }
            None => self,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    /// Wait for exit, bounded by the given timeout
    Wait(Duration),
    /// Spawn and return immediately; the child keeps running and is
    /// tracked under its label and the interface it serves
    Detached { interface: String },
}

/// Tracked children: (label, interface) -> PIDs
type Tracked = Mutex<HashMap<(String, String), Vec<u32>>>;

#[derive(Debug, Clone, Default)]
pub struct LaunchOutput {
    /// Exit code, None for detached launches
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// PID of a detached child
    pub pid: Option<u32>,
}

/// Kill target scoped to one interface
///
/// Only constructible with an interface name so an unscoped pattern (which
/// would also hit the ethernet DHCP client) cannot be expressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillTarget {
    label: String,
    interface: String,
    pattern: String,
}

impl KillTarget {
    pub fn scoped(label: &str, program: &str, interface: &str) -> Self {
        Self {
            label: label.to_string(),
            interface: interface.to_string(),
            pattern: format!("{}.*{}", program, interface),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

pub struct ProcessController {
    tracked: Arc<Tracked>,
    kill_timeout: Duration,
    query_timeout: Duration,
}

impl ProcessController {
    pub fn new(kill_timeout: Duration, query_timeout: Duration) -> Self {
        Self {
            tracked: Arc::new(Mutex::new(HashMap::new())),
            kill_timeout,
            query_timeout,
        }
    }

    /// Run a command
    ///
    /// A non-zero exit status is an error carrying stderr. A bound violation
    /// kills the child and returns `PlatformError::Timeout`.
    pub async fn launch(
        &self,
        label: &str,
        command: &CommandLine,
        mode: LaunchMode,
    ) -> PlatformResult<LaunchOutput> {
        debug!("{}: launching {}", label, command);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match mode {
            LaunchMode::Wait(timeout) => {
                cmd.kill_on_drop(true);
                let child = cmd.spawn().map_err(|source| PlatformError::Spawn {
                    command: command.to_string(),
                    source,
                })?;

                let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
                    Ok(Ok(output)) => output,
                    Ok(Err(source)) => {
                        return Err(PlatformError::Spawn {
                            command: command.to_string(),
                            source,
                        })
                    }
                    Err(_) => {
                        return Err(PlatformError::Timeout {
                            command: command.to_string(),
                            timeout,
                        })
                    }
                };

                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                if !stdout.trim().is_empty() {
                    debug!("{} stdout: {}", label, stdout.trim_end());
                }
                if !stderr.trim().is_empty() {
                    debug!("{} stderr: {}", label, stderr.trim_end());
                }
                debug!("{} exited with {:?}", label, output.status.code());

                if !output.status.success() {
                    return Err(PlatformError::Failed {
                        command: command.to_string(),
                        status: output
                            .status
                            .code()
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| "signal".to_string()),
                        stderr: stderr.trim().to_string(),
                    });
                }

                Ok(LaunchOutput {
                    status: output.status.code(),
                    stdout,
                    stderr,
                    pid: None,
                })
            }
            LaunchMode::Detached { interface } => {
                let mut child = cmd.spawn().map_err(|source| PlatformError::Spawn {
                    command: command.to_string(),
                    source,
                })?;
                let pid = child.id();

                if let Some(stdout) = child.stdout.take() {
                    forward_output(format!("{} stdout", label), stdout);
                }
                if let Some(stderr) = child.stderr.take() {
                    forward_output(format!("{} stderr", label), stderr);
                }

                let key = (label.to_string(), interface);
                if let Some(pid) = pid {
                    self.track(&key, pid);
                }

                let tracked = Arc::clone(&self.tracked);
                tokio::spawn(async move {
                    let status = child.wait().await;
                    debug!(
                        "{} child process exited with {:?}",
                        key.0,
                        status.ok().and_then(|s| s.code())
                    );
                    if let Some(pid) = pid {
                        untrack(&tracked, &key, pid);
                    }
                });

                Ok(LaunchOutput {
                    pid,
                    ..Default::default()
                })
            }
        }
    }

    /// Terminate processes matching a scoped target
    ///
    /// Children tracked for the target's label and interface are signalled
    /// directly, then `pkill -f` catches the rest. Nothing matching is not
    /// an error; a bound violation is a no-op.
    pub async fn kill(&self, target: &KillTarget) {
        let key = (target.label().to_string(), target.interface().to_string());
        let pids = self
            .tracked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key)
            .unwrap_or_default();

        for pid in pids {
            match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => debug!(
                    "kill(): terminated tracked {} on {} (pid {})",
                    target.label(),
                    target.interface(),
                    pid
                ),
                Err(Errno::ESRCH) => debug!(
                    "kill(): tracked {} (pid {}) already gone",
                    target.label(),
                    pid
                ),
                Err(e) => warn!("kill(): could not signal pid {}: {}", pid, e),
            }
        }

        let command = CommandLine::new("pkill").args(["-f", target.pattern()]);
        match self.launch("pkill", &command, LaunchMode::Wait(self.kill_timeout)).await {
            Ok(_) => debug!("kill(): success: {}", target.pattern()),
            Err(e) if e.is_timeout() => {
                warn!(
                    "kill() timed out after {}s for: {}",
                    self.kill_timeout.as_secs(),
                    target.pattern()
                );
            }
            Err(_) => debug!("kill(): no processes found: {}", target.pattern()),
        }
    }

    /// Whether any process matches `pattern`
    pub async fn is_running(&self, pattern: &str) -> bool {
        let command = CommandLine::new("pgrep").args(["-f", pattern]);
        self.launch("pgrep", &command, LaunchMode::Wait(self.query_timeout))
            .await
            .is_ok()
    }

    /// PIDs of detached children still alive under `label` on `interface`
    #[cfg(test)]
    fn tracked(&self, label: &str, interface: &str) -> Vec<u32> {
        self.tracked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(label.to_string(), interface.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn track(&self, key: &(String, String), pid: u32) {
        self.tracked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key.clone())
            .or_default()
            .push(pid);
    }
}

fn untrack(tracked: &Tracked, key: &(String, String), pid: u32) {
    let mut tracked = tracked.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(pids) = tracked.get_mut(key) {
        pids.retain(|p| *p != pid);
        if pids.is_empty() {
            tracked.remove(key);
        }
    }
}

fn forward_output<R>(prefix: String, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("{}: {}", prefix, line);
        }
    });
}
