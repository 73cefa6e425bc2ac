//! Render loops: the interactive terminal view and the one-shot snapshot

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{
    event::Event,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use tracing::{info, warn};

use mbot_common::stats::{self, RATE_WINDOW};
use mbot_common::{ChannelTable, SchemaRegistry, ShutdownSignal};

use crate::app::App;
use crate::events;
use crate::format;
use crate::ui;

/// Longest the loop blocks waiting for a key press
const EVENT_POLL: Duration = Duration::from_millis(100);

/// Built-in schemas plus the optional module. A module that fails to load is
/// reported and skipped.
pub fn build_registry(module: Option<&Path>) -> Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::builtin()?;
    if let Some(path) = module {
        match registry.load_module(path) {
            Ok(added) => info!("Loaded {added} message types from {}", path.display()),
            Err(e) => warn!("Could not load module {}: {e}", path.display()),
        }
    }
    Ok(registry)
}

/// Run the terminal UI until the user quits or shutdown is triggered
pub fn run_tui(mut app: App, refresh: Duration, shutdown: ShutdownSignal) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Setup panic hook to restore terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic);
    }));

    let result = run_app(&mut terminal, &mut app, refresh, &shutdown);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    refresh: Duration,
    shutdown: &ShutdownSignal,
) -> Result<()> {
    let mut last_refresh = Instant::now();
    app.refresh(last_refresh);

    while app.running && !shutdown.is_triggered() {
        terminal.draw(|frame| ui::draw(frame, app))?;

        if let Some(Event::Key(key)) = events::poll_event(EVENT_POLL.min(refresh))? {
            events::handle_key_event(app, key);
        }

        if last_refresh.elapsed() >= refresh {
            last_refresh = Instant::now();
            app.refresh(last_refresh);
        }
    }

    Ok(())
}

/// Wait one rate window, then format the table as plain text
pub async fn snapshot_once(table: Arc<ChannelTable>, detail_order: &[String]) -> String {
    tokio::time::sleep(RATE_WINDOW).await;
    let channels = stats::channel_stats(&table, Instant::now());
    format::plain_text(&channels, detail_order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbot_common::schema::{DecodedMessage, FieldValue};
    use ratatui::backend::TestBackend;
    use std::fs;

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_module_failure_keeps_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.lcm");
        fs::write(&broken, "struct broken_t {").unwrap();

        let builtin = SchemaRegistry::builtin().unwrap().len();
        assert_eq!(build_registry(Some(&broken)).unwrap().len(), builtin);
        assert_eq!(build_registry(Some(&dir.path().join("absent"))).unwrap().len(), builtin);
    }

    #[test]
    fn test_module_types_are_added() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cell_t.lcm"), "struct cell_t { int64_t utime; float v; }")
            .unwrap();
        let registry = build_registry(Some(dir.path())).unwrap();
        assert!(registry.get("cell_t").is_some());
    }

    #[test]
    fn test_draws_channels_and_decoded_fields() {
        let table = Arc::new(ChannelTable::with_detail_channels(["MBOT_VEL"]));
        let now = Instant::now();
        let velocity = DecodedMessage {
            type_name: "twist2D_t".to_string(),
            fields: vec![("vx".to_string(), FieldValue::Float(0.5))],
        };
        table.upsert("MBOT_VEL", now, 24, Some(velocity));
        table.upsert("RAW", now, 8, None);

        let mut app = App::new(table, "memq://", vec!["MBOT_VEL".to_string()]);
        app.refresh(now);

        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| ui::draw(frame, &app)).unwrap();
        let text = screen_text(&terminal);

        assert!(text.contains("MBot LCM Spy"));
        assert!(text.contains("MBOT_VEL"));
        assert!(text.contains("twist2D_t"));
        assert!(text.contains("unknown"));
        assert!(text.contains("Decoded Messages"));
        assert!(text.contains("vx"));
        assert!(text.contains("0.5000"));
        assert!(text.contains("2 channels"));
    }

    #[test]
    fn test_help_overlay() {
        let mut app = App::new(Arc::new(ChannelTable::new()), "memq://", Vec::new());
        app.refresh(Instant::now());
        app.toggle_help();

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|frame| ui::draw(frame, &app)).unwrap();
        assert!(screen_text(&terminal).contains("Keyboard Shortcuts"));
    }

    #[tokio::test]
    async fn test_snapshot_once_waits_one_window() {
        let table = Arc::new(ChannelTable::new());
        table.upsert("X", Instant::now(), 1, None);
        let text = snapshot_once(table, &[]).await;
        assert!(text.starts_with("Channel"));
        assert!(text.contains("X "));
    }
}
