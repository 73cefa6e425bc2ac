//! 'main' for the MBot status tool

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mbot_common::ingest::IngestLoop;
use mbot_common::{transport, SchemaRegistry, Shutdown, TelemetryConfig};
use mbot_status::readings::{self, SharedStatus};
use mbot_status::{runner, Args, StatusMonitor, StatusSettings, SystemProbe};

#[tokio::main]
pub async fn main() -> Result<()> {
    let args = Args::parse();

    // Status goes to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = TelemetryConfig::load(args.config.as_deref())?;
    let settings = StatusSettings::resolve(&args, &config)?;
    info!("MBot status");

    let registry = Arc::new(SchemaRegistry::builtin()?);
    let status = SharedStatus::default();

    let mut transport = transport::connect(&settings.url)
        .with_context(|| format!("Cannot open transport {}", settings.url))?;
    let subscriptions = readings::subscribe_sensors(
        transport.as_mut(),
        registry,
        status.clone(),
        &settings.status,
    )?;

    let shutdown = Shutdown::new();
    let ingest = IngestLoop::new(transport, settings.poll_timeout, shutdown.signal()).spawn();

    let monitor = StatusMonitor::new(status, &settings.status);
    let signal = shutdown.signal();
    let render_settings = settings.clone();
    let mut render = tokio::task::spawn_blocking(move || {
        runner::run(&monitor, &SystemProbe, &render_settings, &signal, &mut std::io::stdout())
    });
    let rendered = tokio::select! {
        result = &mut render => result?,
        _ = tokio::signal::ctrl_c() => {
            shutdown.trigger();
            render.await?
        }
    };

    shutdown.trigger();
    let mut exit = ingest.await?;
    for id in subscriptions {
        exit.transport.unsubscribe(id)?;
    }
    rendered?;
    if let Some(e) = exit.fatal {
        return Err(e).context("Transport closed");
    }

    info!("Exiting");
    Ok(())
}
