//! # mbot-lcm-spy
//!
//! A terminal monitor for LCM traffic on the MBot.
//!
//! Subscribes to every channel on the bus, works out each channel's message
//! type by trial-decoding against the known LCM types, and shows per-channel
//! message rates over a one second window. Decoded fields of selected
//! channels are shown below the channel table.
//!
//! ## Usage
//!
//! ```bash
//! # Watch everything, with the decoded IMU and odometry messages
//! mbot-lcm-spy --channels MBOT_IMU,MBOT_ODOMETRY
//!
//! # Include project-specific message types
//! mbot-lcm-spy --module ~/my_lcmtypes
//!
//! # Print a single snapshot and exit
//! mbot-lcm-spy --once
//! ```

pub mod app;
pub mod cli;
pub mod events;
pub mod format;
pub mod runner;
pub mod ui;

// Re-export main types for convenience
pub use app::App;
pub use cli::{Args, SpySettings};
