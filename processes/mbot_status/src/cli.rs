use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};

use mbot_common::configuration::{self, StatusConfig, TelemetryConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Topic {
    /// Battery voltage
    Battery,
    /// CPU temperature
    Temperature,
    /// Sensor and USB self-test
    Test,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Battery => write!(f, "battery"),
            Topic::Temperature => write!(f, "temperature"),
            Topic::Test => write!(f, "test"),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "mbot-status")]
#[command(about = "Show MBot battery, temperature and sensor status")]
pub struct Args {
    /// Topic to show (default: battery voltage and temperature)
    #[arg(long, value_enum)]
    pub topic: Option<Topic>,

    /// Keep refreshing the status until interrupted
    #[arg(long)]
    pub continuous: bool,

    /// Explain the readings of the selected topic
    #[arg(long, requires = "topic")]
    pub verbose: bool,

    /// Refresh rate in continuous mode, in Hz
    #[arg(long)]
    pub rate: Option<f64>,

    /// Transport URL, e.g. udpm://239.255.76.67:7667?ttl=0
    #[arg(long)]
    pub url: Option<String>,

    /// Configuration file layered over the defaults
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Effective settings: command line over configuration
#[derive(Debug, Clone)]
pub struct StatusSettings {
    pub url: String,
    pub poll_timeout: Duration,
    pub topic: Option<Topic>,
    pub continuous: bool,
    pub verbose: bool,
    pub refresh: Duration,
    pub status: StatusConfig,
}

impl StatusSettings {
    pub fn resolve(args: &Args, config: &TelemetryConfig) -> Result<Self> {
        let rate = args.rate.unwrap_or(config.status.rate);
        if !(rate.is_finite() && rate > 0.0) {
            bail!("Refresh rate must be greater than zero, got {rate}");
        }
        Ok(Self {
            url: args.url.clone().unwrap_or_else(|| config.transport.url.clone()),
            poll_timeout: config.transport.poll_timeout(),
            topic: args.topic,
            continuous: args.continuous,
            verbose: args.verbose,
            refresh: configuration::period(rate),
            status: config.status.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> TelemetryConfig {
        TelemetryConfig::load(None).unwrap()
    }

    #[test]
    fn test_topics() {
        for (text, topic) in [
            ("battery", Topic::Battery),
            ("temperature", Topic::Temperature),
            ("test", Topic::Test),
        ] {
            let args = Args::try_parse_from(["mbot-status", "--topic", text]).unwrap();
            assert_eq!(args.topic, Some(topic));
            assert_eq!(topic.to_string(), text);
        }
        assert!(Args::try_parse_from(["mbot-status", "--topic", "wifi"]).is_err());
    }

    #[test]
    fn test_verbose_requires_topic() {
        assert!(Args::try_parse_from(["mbot-status", "--verbose"]).is_err());
        let args =
            Args::try_parse_from(["mbot-status", "--topic", "battery", "--verbose"]).unwrap();
        assert!(args.verbose);
    }

    #[test]
    fn test_settings() {
        let args = Args::try_parse_from(["mbot-status", "--continuous", "--rate", "4"]).unwrap();
        let settings = StatusSettings::resolve(&args, &defaults()).unwrap();
        assert!(settings.continuous);
        assert_eq!(settings.refresh, Duration::from_millis(250));
        assert_eq!(settings.status.battery_channel, "MBOT_ANALOG_IN");

        let args = Args::try_parse_from(["mbot-status", "--rate", "0"]).unwrap();
        assert!(StatusSettings::resolve(&args, &defaults()).is_err());
    }
}
