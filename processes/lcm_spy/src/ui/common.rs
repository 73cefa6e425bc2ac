use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use crate::app::App;

/// Render the title bar at the top
pub fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" MBot LCM Spy ", app.theme.header),
        Span::styled(
            format!(" {} ", app.transport),
            Style::default().add_modifier(Modifier::DIM),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

/// Render the status bar at the bottom
pub fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let status = if app.filter_active {
        format!(" Filter: {}_ | Enter:apply Esc:clear", app.filter_text)
    } else {
        let shown = app.visible_channels().len();
        let total = app.channels.len();
        let channels = if shown == total {
            format!("{total} channels")
        } else {
            format!("{shown}/{total} channels")
        };
        format!(
            " {} | {:.1} msg/s | q:quit s:sort /:filter ?:help",
            channels,
            app.total_rate()
        )
    };

    let paragraph = Paragraph::new(status).style(Style::default().add_modifier(Modifier::DIM));
    frame.render_widget(paragraph, area);
}

/// Render the help overlay
pub fn render_help(frame: &mut Frame, app: &App, area: Rect) {
    let help_text = vec![
        Line::from(vec![Span::styled("Keyboard Shortcuts", app.theme.header)]),
        Line::from(""),
        Line::from("  q, Ctrl-C  Quit"),
        Line::from("  Up/k       Select previous"),
        Line::from("  Down/j     Select next"),
        Line::from("  s          Cycle sort column"),
        Line::from("  S          Reverse sort order"),
        Line::from("  /          Filter channels"),
        Line::from("  Esc        Clear filter"),
        Line::from("  ?          Toggle this help"),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Press any key to close",
            Style::default().add_modifier(Modifier::DIM),
        )]),
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.highlight));

    let paragraph = Paragraph::new(help_text).block(block);

    // Center the help overlay
    let help_width = 40;
    let help_height = 14;
    let x = area.x + (area.width.saturating_sub(help_width)) / 2;
    let y = area.y + (area.height.saturating_sub(help_height)) / 2;
    let help_area = Rect::new(
        x,
        y,
        help_width.min(area.width),
        help_height.min(area.height),
    );

    // Clear the area behind the help
    frame.render_widget(Clear, help_area);
    frame.render_widget(paragraph, help_area);
}
