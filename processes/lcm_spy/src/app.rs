use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use mbot_common::stats::{self, ChannelStats};
use mbot_common::ChannelTable;

use crate::ui::summary::SortColumn;
use crate::ui::Theme;

pub struct App {
    pub running: bool,
    pub show_help: bool,

    // Data
    pub table: Arc<ChannelTable>,
    pub transport: String,
    pub channels: Vec<ChannelStats>,
    pub refreshed_at: Instant,
    /// Detail channels in command-line order
    pub detail_order: Vec<String>,

    // Navigation state
    pub selected_index: usize,

    // Sorting
    pub sort_column: SortColumn,
    pub sort_ascending: bool,

    // Search/filter
    pub filter_text: String,
    pub filter_active: bool,

    // UI
    pub theme: Theme,
}

impl App {
    pub fn new(table: Arc<ChannelTable>, transport: &str, detail_order: Vec<String>) -> Self {
        Self {
            running: true,
            show_help: false,
            table,
            transport: transport.to_string(),
            channels: Vec::new(),
            refreshed_at: Instant::now(),
            detail_order,
            selected_index: 0,
            sort_column: SortColumn::default(),
            sort_ascending: true,
            filter_text: String::new(),
            filter_active: false,
            theme: Theme::default(),
        }
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    /// Take a fresh snapshot of the channel table
    pub fn refresh(&mut self, now: Instant) {
        self.channels = stats::channel_stats(&self.table, now);
        self.refreshed_at = now;
        let visible = self.visible_channels().len();
        if self.selected_index >= visible {
            self.selected_index = visible.saturating_sub(1);
        }
    }

    /// Channels passing the filter, in the current sort order
    pub fn visible_channels(&self) -> Vec<&ChannelStats> {
        let mut visible: Vec<&ChannelStats> =
            self.channels.iter().filter(|c| self.matches_filter(&c.record.name)).collect();
        let column = self.sort_column;
        visible.sort_by(|a, b| {
            let cmp = compare(column, a, b);
            if self.sort_ascending {
                cmp
            } else {
                cmp.reverse()
            }
        });
        visible
    }

    /// Detail channels that have a decoded message, in command-line order
    pub fn detail_channels(&self) -> Vec<&ChannelStats> {
        self.detail_order
            .iter()
            .filter_map(|name| self.channels.iter().find(|c| &c.record.name == name))
            .filter(|c| c.record.last_decoded.is_some())
            .collect()
    }

    pub fn total_rate(&self) -> f64 {
        stats::total_rate(&self.channels)
    }

    pub fn select_next(&mut self) {
        let count = self.visible_channels().len();
        if self.selected_index < count.saturating_sub(1) {
            self.selected_index += 1;
        }
    }

    pub fn select_prev(&mut self) {
        if self.selected_index > 0 {
            self.selected_index -= 1;
        }
    }

    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    pub fn cycle_sort(&mut self) {
        self.sort_column = self.sort_column.next();
    }

    pub fn toggle_sort_direction(&mut self) {
        self.sort_ascending = !self.sort_ascending;
    }

    pub fn start_filter(&mut self) {
        self.filter_active = true;
    }

    pub fn finish_filter(&mut self) {
        self.filter_active = false;
    }

    pub fn clear_filter(&mut self) {
        self.filter_text.clear();
        self.filter_active = false;
        self.selected_index = 0;
    }

    pub fn filter_push(&mut self, c: char) {
        self.filter_text.push(c);
        self.selected_index = 0;
    }

    pub fn filter_pop(&mut self) {
        self.filter_text.pop();
    }

    /// Check if a channel name matches the current filter
    pub fn matches_filter(&self, name: &str) -> bool {
        if self.filter_text.is_empty() {
            return true;
        }
        name.to_lowercase().contains(&self.filter_text.to_lowercase())
    }

    pub fn quit(&mut self) {
        self.running = false;
    }
}

fn compare(column: SortColumn, a: &ChannelStats, b: &ChannelStats) -> Ordering {
    let by_name = a.record.name.cmp(&b.record.name);
    let cmp = match column {
        SortColumn::Channel => by_name,
        SortColumn::Type => a.record.inferred_type.cmp(&b.record.inferred_type),
        SortColumn::Rate => a.rate.total_cmp(&b.rate),
        SortColumn::Total => a.record.total_count.cmp(&b.record.total_count),
        SortColumn::Age => a.age.cmp(&b.age),
    };
    cmp.then(by_name)
}
