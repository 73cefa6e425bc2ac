use ratatui::{
    layout::{Constraint, Rect},
    style::{Modifier, Style},
    widgets::{Block, Borders, Cell, Row, Table, TableState},
    Frame,
};

use mbot_common::stats::RATE_WINDOW;

use crate::app::App;
use crate::format::{format_age, format_count, format_rate, truncate};

/// Column to sort channels by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortColumn {
    #[default]
    Channel,
    Type,
    Rate,
    Total,
    Age,
}

impl SortColumn {
    pub fn next(self) -> Self {
        match self {
            Self::Channel => Self::Type,
            Self::Type => Self::Rate,
            Self::Rate => Self::Total,
            Self::Total => Self::Age,
            Self::Age => Self::Channel,
        }
    }
}

const COL_TYPE: usize = 24;

/// Render the summary view - table of all channels
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let visible = app.visible_channels();

    let heading = |name: &'static str, column: SortColumn| {
        let (text, style) = if app.sort_column == column {
            let arrow = if app.sort_ascending { "↑" } else { "↓" };
            (format!("{name}{arrow}"), app.theme.header.add_modifier(Modifier::UNDERLINED))
        } else {
            (name.to_string(), app.theme.header)
        };
        Cell::from(text).style(style)
    };

    let header = Row::new(vec![
        heading("Channel", SortColumn::Channel),
        heading("Type", SortColumn::Type),
        heading("Rate (Hz)", SortColumn::Rate),
        heading("Msgs Rcvd", SortColumn::Total),
        heading("Last Seen", SortColumn::Age),
    ])
    .height(1);

    let rows: Vec<Row> = visible
        .iter()
        .map(|c| {
            let record = &c.record;
            let type_style = if record.is_known_type() {
                Style::default()
            } else {
                Style::default().fg(app.theme.unknown)
            };
            let row = Row::new(vec![
                Cell::from(record.name.clone()),
                Cell::from(truncate(&record.inferred_type, COL_TYPE)).style(type_style),
                Cell::from(format_rate(c.rate)).style(app.theme.rate_style(c.rate)),
                Cell::from(format_count(record.total_count)),
                Cell::from(format_age(c.age)),
            ]);
            // Quiet channels fade out
            if c.age >= RATE_WINDOW {
                row.style(app.theme.stale)
            } else {
                row
            }
        })
        .collect();

    let widths = [
        Constraint::Min(24),
        Constraint::Length(COL_TYPE as u16),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(10),
    ];

    let title = if app.filter_text.is_empty() {
        " Channels ".to_string()
    } else {
        format!(" Channels [filter: \"{}\"] ", app.filter_text)
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_type(app.theme.border_type)
                .border_style(Style::default().fg(app.theme.border)),
        )
        .row_highlight_style(app.theme.selected)
        .highlight_symbol("> ");

    let mut state = TableState::default();
    if !visible.is_empty() {
        state.select(Some(app.selected_index));
    }

    frame.render_stateful_widget(table, area, &mut state);
}
