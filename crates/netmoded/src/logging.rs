//! Logging setup
//!
//! Console lines go to the journal, which stamps them itself. The
//! diagnostic log file gets its own timestamps.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Filter directive for the requested verbosity
///
/// `RUST_LOG` wins when set.
fn filter(debug: bool) -> EnvFilter {
    let default = if debug { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber
///
/// A log file that cannot be opened is reported on the console and
/// skipped; the daemon still runs.
pub fn init(log_file: &Path, debug: bool) -> Result<()> {
    let console = fmt::layer()
        .with_target(false)
        .without_time()
        .with_filter(filter(debug));

    let file_layer = match open_log(log_file) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
                .with_filter(filter(debug)),
        ),
        Err(e) => {
            eprintln!("netmoded: {:#}", e);
            None
        }
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")
}

fn open_log(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}
