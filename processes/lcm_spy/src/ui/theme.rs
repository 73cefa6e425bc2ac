use ratatui::{
    style::{Color, Modifier, Style},
    widgets::BorderType,
};

/// Luma above which the terminal background counts as light
const LIGHT_BACKGROUND_LUMA: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Theme {
    pub header: Style,
    pub selected: Style,
    pub stale: Style,
    pub border: Color,
    pub highlight: Color,
    pub active: Color,
    pub unknown: Color,
    pub border_type: BorderType,
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            header: Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            selected: Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD),
            stale: Style::default().add_modifier(Modifier::DIM),
            border: Color::Gray,
            highlight: Color::Yellow,
            active: Color::Green,
            unknown: Color::Magenta,
            border_type: BorderType::Rounded,
        }
    }

    pub fn light() -> Self {
        Self {
            header: Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
            selected: Style::default().bg(Color::Gray).add_modifier(Modifier::BOLD),
            stale: Style::default().fg(Color::DarkGray),
            border: Color::DarkGray,
            highlight: Color::Blue,
            active: Color::Green,
            unknown: Color::Red,
            border_type: BorderType::Rounded,
        }
    }

    /// Pick a theme from the terminal's background colour
    pub fn auto_detect() -> Self {
        match terminal_light::luma() {
            Ok(luma) if luma > LIGHT_BACKGROUND_LUMA => Self::light(),
            _ => Self::dark(),
        }
    }

    /// Style of a channel row's rate column
    pub fn rate_style(&self, rate: f64) -> Style {
        if rate > 0.0 {
            Style::default().fg(self.active)
        } else {
            self.stale
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}
