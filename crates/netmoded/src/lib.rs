//! netmoded - network interface arbitration daemon
//!
//! Decides whether the WiFi interface joins a configured network, serves
//! its own hotspot, or stays offline, and publishes that decision for the
//! rest of the system. With single network mode on, an active ethernet
//! link keeps WiFi in scan mode: up, scan capable, never associated.

pub mod arbitrator;
pub mod auth;
pub mod capabilities;
pub mod error;
pub mod ethernet;
pub mod inspector;
pub mod logging;
pub mod platform;
pub mod process;
pub mod regdomain;
pub mod timings;

pub use arbitrator::{Arbitrator, Interfaces, Mode, Settlement};
pub use error::{PlatformError, PlatformResult};
pub use ethernet::{EthernetWatcher, Transition, TransitionAction};
pub use inspector::InterfaceInspector;
pub use platform::{Platform, SystemPlatform};
pub use timings::Timings;
