//! 'main' for the MBot LCM spy

use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mbot_common::ingest::{track_channels, IngestLoop};
use mbot_common::{transport, ChannelTable, Shutdown, TelemetryConfig};
use mbot_lcm_spy::ui::Theme;
use mbot_lcm_spy::{runner, App, Args, SpySettings};

fn init_logging(log_file: Option<&Path>, once: bool) -> Result<()> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Cannot create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        // Plain output leaves stderr free for warnings
        None if once => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
                )
                .with_writer(std::io::stderr)
                .init();
        }
        // The TUI owns the terminal; without a log file, logs are dropped
        None => {}
    }
    Ok(())
}

#[tokio::main]
pub async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref(), args.once)?;

    // Configuration errors end the process before anything is subscribed
    let config = TelemetryConfig::load(args.config.as_deref())?;
    let settings = SpySettings::resolve(&args, &config)?;
    info!("MBot LCM spy");

    let registry = Arc::new(runner::build_registry(settings.module.as_deref())?);
    let table = Arc::new(ChannelTable::with_detail_channels(
        settings.detail_channels.iter().cloned(),
    ));

    let mut transport = transport::connect(&settings.url)
        .with_context(|| format!("Cannot open transport {}", settings.url))?;
    let description = transport.description().to_string();
    let subscription =
        track_channels(transport.as_mut(), &settings.subscribe, table.clone(), registry)?;

    let shutdown = Shutdown::new();
    let ingest = IngestLoop::new(transport, settings.poll_timeout, shutdown.signal()).spawn();

    let rendered = if settings.once {
        tokio::select! {
            text = runner::snapshot_once(table.clone(), &settings.detail_channels) => {
                print!("{text}");
                Ok(())
            }
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    } else {
        let app = App::new(table.clone(), &description, settings.detail_channels.clone())
            .with_theme(Theme::auto_detect());
        let signal = shutdown.signal();
        let refresh = settings.refresh;
        let mut render = tokio::task::spawn_blocking(move || runner::run_tui(app, refresh, signal));
        tokio::select! {
            result = &mut render => result?,
            _ = tokio::signal::ctrl_c() => {
                shutdown.trigger();
                render.await?
            }
        }
    };

    // Stop ingest, then release the subscription on the returned transport
    shutdown.trigger();
    let mut exit = ingest.await?;
    exit.transport.unsubscribe(subscription)?;
    rendered?;
    if let Some(e) = exit.fatal {
        return Err(e).context("Transport closed");
    }

    info!("Exiting");
    Ok(())
}
