//! Configuration shared by the telemetry tools
//!
//! Defaults are embedded from `config.default.toml`; a user file and
//! `MBOT_`-prefixed environment variables are layered on top.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::health::{ImuCheck, VoltageNote};
use crate::transport::TransportUrl;

pub const ENV_PREFIX: &str = "MBOT";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransportConfig {
    pub url: String,
    pub poll_timeout_ms: u64,
}

impl TransportConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SpyConfig {
    pub subscribe: String,
    pub detail_channels: Vec<String>,
    pub rate: f64,
    #[serde(default)]
    pub module: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StatusConfig {
    pub rate: f64,
    pub staleness_threshold_ms: u64,
    pub battery_channel: String,
    pub battery_volts_index: usize,
    pub imu_channel: String,
    pub imu_check: ImuCheck,
    pub lidar_channel: String,
    pub lidar_min_ranges: usize,
    pub control_board_fragments: Vec<String>,
    pub serial_bridge_fragments: Vec<String>,
    pub voltage_notes: Vec<VoltageNote>,
}

impl StatusConfig {
    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_millis(self.staleness_threshold_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TelemetryConfig {
    pub transport: TransportConfig,
    pub spy: SpyConfig,
    pub status: StatusConfig,
}

impl TelemetryConfig {
    /// Layer `config` over the embedded defaults and validate the result
    pub fn try_load(config: &Config) -> Result<Self> {
        let full_config = Config::builder()
            .add_source(File::from_str(
                include_str!("../config.default.toml"),
                FileFormat::Toml,
            ))
            .add_source(config.clone())
            .build()?;
        let loaded: Self = full_config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Load from an optional user file plus the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            if !path.exists() {
                bail!("Config file {} does not exist", path.display());
            }
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        Self::try_load(&config)
    }

    pub fn validate(&self) -> Result<()> {
        TransportUrl::parse(&self.transport.url)?;
        if self.transport.poll_timeout_ms == 0 {
            bail!("transport.poll-timeout-ms must be positive");
        }
        if !(self.spy.rate.is_finite() && self.spy.rate > 0.0) {
            bail!("spy.rate must be a positive number of Hz, got {}", self.spy.rate);
        }
        if !(self.status.rate.is_finite() && self.status.rate > 0.0) {
            bail!("status.rate must be a positive number of Hz, got {}", self.status.rate);
        }
        if self.status.staleness_threshold_ms == 0 {
            bail!("status.staleness-threshold-ms must be positive");
        }
        if self.status.voltage_notes.is_empty() {
            bail!("status.voltage-notes must not be empty");
        }
        Ok(())
    }
}

/// Period of a loop running at `rate_hz`
pub fn period(rate_hz: f64) -> Duration {
    Duration::from_secs_f64(1.0 / rate_hz)
}
