//! Single-shot and continuous status output

use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{
    cursor::MoveTo,
    queue,
    terminal::{Clear, ClearType},
};
use tracing::debug;

use mbot_common::ShutdownSignal;

use crate::cli::{StatusSettings, Topic};
use crate::report::{format_status, HostProbe, StatusMonitor};

/// How often readiness is re-checked while waiting for the first readings
const READY_POLL: Duration = Duration::from_millis(50);

/// Wait until the readings for `topic` arrived, `timeout` passed or shutdown
/// was requested. Returns whether the readings arrived.
pub fn wait_until_ready(
    monitor: &StatusMonitor,
    topic: Option<Topic>,
    timeout: Duration,
    shutdown: &ShutdownSignal,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if monitor.is_ready(topic) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline || shutdown.wait_timeout(READY_POLL.min(deadline - now)) {
            debug!("Gave up waiting for readings after {timeout:?}");
            return false;
        }
    }
}

/// Print one status block, or keep redrawing it in continuous mode until
/// shutdown is triggered
pub fn run<W: Write>(
    monitor: &StatusMonitor,
    probe: &dyn HostProbe,
    settings: &StatusSettings,
    shutdown: &ShutdownSignal,
    out: &mut W,
) -> Result<()> {
    if !settings.continuous {
        wait_until_ready(monitor, settings.topic, settings.poll_timeout, shutdown);
        let snapshot = monitor.sample(probe, settings.topic, Instant::now());
        write!(out, "{}", format_status(&snapshot, settings.topic, settings.verbose))?;
        out.flush()?;
        return Ok(());
    }

    while !shutdown.is_triggered() {
        let started = Instant::now();
        let snapshot = monitor.sample(probe, settings.topic, started);
        queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
        write!(out, "{}", format_status(&snapshot, settings.topic, settings.verbose))?;
        out.flush()?;
        shutdown.wait_timeout(settings.refresh.saturating_sub(started.elapsed()));
    }
    Ok(())
}
