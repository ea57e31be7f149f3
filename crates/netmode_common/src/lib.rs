//! Shared state for the network mode daemon.
//!
//! File layout, configuration gateway, one-shot marker files and the
//! published network decision. The UI and backend link this crate to read
//! what `netmoded` decided without talking to the daemon.

pub mod config;
pub mod error;
pub mod markers;
pub mod paths;
pub mod status;

pub use config::{supplicant_driver, ConfigGateway, EnvParameters, NetworkConfig, Setting};
pub use error::{CommonError, CommonResult};
pub use markers::Markers;
pub use paths::DaemonPaths;
pub use status::{NetworkDecision, PublishedStatus, StatusPublisher, WiredStatus};
