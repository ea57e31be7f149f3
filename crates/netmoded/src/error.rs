//! Errors raised by platform operations.
//!
//! These never reach the daemon's top level: the Arbitrator turns every one
//! of them into a retry, a fallback or a settled state.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("`{command}` did not finish within {}ms", timeout.as_millis())]
    Timeout { command: String, timeout: Duration },

    #[error("{0}")]
    Unavailable(String),
}

impl PlatformError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PlatformError::Timeout { .. })
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;
