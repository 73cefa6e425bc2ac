pub mod common;
pub mod detail;
pub mod summary;
pub mod theme;

pub use summary::SortColumn;
pub use theme::Theme;

use ratatui::{
    layout::{Constraint, Layout},
    Frame,
};

use crate::app::App;

/// Draw the whole screen
pub fn draw(frame: &mut Frame, app: &App) {
    let detail_rows = detail::height(app);
    let chunks = Layout::vertical([
        Constraint::Length(1),           // Header bar
        Constraint::Min(5),              // Channel table
        Constraint::Length(detail_rows), // Decoded messages
        Constraint::Length(1),           // Status bar
    ])
    .split(frame.area());

    common::render_header(frame, app, chunks[0]);
    summary::render(frame, app, chunks[1]);
    if detail_rows > 0 {
        detail::render(frame, app, chunks[2]);
    }
    common::render_status_bar(frame, app, chunks[3]);

    if app.show_help {
        common::render_help(frame, app, frame.area());
    }
}
