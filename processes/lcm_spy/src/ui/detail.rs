use ratatui::{
    layout::{Constraint, Rect},
    style::{Modifier, Style},
    widgets::{Block, Borders, Cell, Row, Table},
    Frame,
};

use crate::app::App;
use crate::format::format_size;

/// Tallest the decoded-message panel may grow
const MAX_HEIGHT: u16 = 20;

/// Height needed by the panel; zero when there is nothing to show
pub fn height(app: &App) -> u16 {
    let rows: usize = app
        .detail_channels()
        .iter()
        .filter_map(|c| c.record.last_decoded.as_ref())
        .map(|msg| msg.flatten().len() + 1)
        .sum();
    if rows == 0 {
        return 0;
    }
    // Borders and the header row
    (rows as u16).saturating_add(3).min(MAX_HEIGHT)
}

/// Render the last decoded message of every detail channel
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let header = Row::new(vec![
        Cell::from("Field").style(app.theme.header),
        Cell::from("Value").style(app.theme.header),
    ]);

    let mut rows: Vec<Row> = Vec::new();
    for channel in app.detail_channels() {
        let record = &channel.record;
        let Some(decoded) = record.last_decoded.as_ref() else {
            continue;
        };
        rows.push(
            Row::new(vec![
                Cell::from(record.name.clone()),
                Cell::from(format!("{} ({})", decoded.type_name, format_size(record.last_size))),
            ])
            .style(Style::default().fg(app.theme.highlight).add_modifier(Modifier::BOLD)),
        );
        for (field, value) in decoded.flatten() {
            rows.push(Row::new(vec![Cell::from(format!("  {field}")), Cell::from(value)]));
        }
    }

    let widths = [Constraint::Length(28), Constraint::Min(20)];
    let table = Table::new(rows, widths).header(header).block(
        Block::default()
            .title(" Decoded Messages ")
            .borders(Borders::ALL)
            .border_type(app.theme.border_type)
            .border_style(Style::default().fg(app.theme.border)),
    );
    frame.render_widget(table, area);
}
