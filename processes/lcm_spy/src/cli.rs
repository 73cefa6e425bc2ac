use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;

use mbot_common::configuration::{self, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "mbot-lcm-spy")]
#[command(about = "Monitor LCM channel activity: message types, rates and decoded fields")]
pub struct Args {
    /// Comma-separated list of channels whose decoded messages are shown
    #[arg(long, value_delimiter = ',')]
    pub channels: Vec<String>,

    /// Rate at which the display is refreshed, in Hz
    #[arg(long, value_parser = parse_rate)]
    pub rate: Option<f64>,

    /// Extra message types to decode with: a .lcm file or a directory of them
    #[arg(long)]
    pub module: Option<PathBuf>,

    /// Transport URL, e.g. udpm://239.255.76.67:7667?ttl=0
    #[arg(long)]
    pub url: Option<String>,

    /// Configuration file layered over the defaults
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print one plain-text snapshot after a rate window and exit
    #[arg(long)]
    pub once: bool,

    /// Write logs to this file (the display owns the terminal)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

fn parse_rate(text: &str) -> Result<f64, String> {
    let rate: f64 = text.parse().map_err(|_| format!("'{text}' is not a number"))?;
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err("rate must be greater than zero".to_string())
    }
}

/// Effective settings: command line over configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SpySettings {
    pub url: String,
    pub poll_timeout: Duration,
    pub subscribe: String,
    pub detail_channels: Vec<String>,
    pub refresh: Duration,
    pub module: Option<PathBuf>,
    pub once: bool,
}

impl SpySettings {
    pub fn resolve(args: &Args, config: &TelemetryConfig) -> Result<Self> {
        let detail_channels: Vec<String> = if args.channels.is_empty() {
            config.spy.detail_channels.clone()
        } else {
            args.channels.iter().map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect()
        };
        let rate = args.rate.unwrap_or(config.spy.rate);
        if !(rate.is_finite() && rate > 0.0) {
            bail!("Refresh rate must be greater than zero");
        }

        Ok(Self {
            url: args.url.clone().unwrap_or_else(|| config.transport.url.clone()),
            poll_timeout: config.transport.poll_timeout(),
            subscribe: config.spy.subscribe.clone(),
            detail_channels,
            refresh: configuration::period(rate),
            module: args.module.clone().or_else(|| config.spy.module.as_ref().map(PathBuf::from)),
            once: args.once,
        })
    }
}
