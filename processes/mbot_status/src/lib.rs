//! # mbot-status
//!
//! Reports the MBot's battery voltage and CPU temperature, and runs a quick
//! self-test of the inertial sensor, the lidar and the USB devices.
//!
//! ## Usage
//!
//! ```bash
//! # Battery voltage and CPU temperature
//! mbot-status
//!
//! # Battery voltage with its interpretation
//! mbot-status --topic battery --verbose
//!
//! # Sensor self-test, refreshed twice a second
//! mbot-status --topic test --continuous --rate 2
//! ```

pub mod cli;
pub mod readings;
pub mod report;
pub mod runner;

pub use cli::{Args, StatusSettings, Topic};
pub use report::{HostProbe, StatusMonitor, StatusSnapshot, SystemProbe};
