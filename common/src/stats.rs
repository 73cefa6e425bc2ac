//! Message rate over a sliding window

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::table::{ChannelRecord, ChannelTable};

/// Length of the trailing window the rate is computed over
pub const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Drop timestamps that are `RATE_WINDOW` or more older than `now`
pub fn trim_window(timestamps: &mut VecDeque<Instant>, now: Instant) {
    while let Some(&oldest) = timestamps.front() {
        if now.saturating_duration_since(oldest) < RATE_WINDOW {
            break;
        }
        timestamps.pop_front();
    }
}

/// Messages per second over the trailing window ending at `now`.
///
/// Trims the record's window first, so repeated calls at one instant agree.
pub fn compute_rate(record: &mut ChannelRecord, now: Instant) -> f64 {
    trim_window(&mut record.arrival_timestamps, now);
    record.arrival_timestamps.len() as f64 / RATE_WINDOW.as_secs_f64()
}

/// A channel as shown by the renderers
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStats {
    pub record: ChannelRecord,
    pub rate: f64,
    /// Time since the last message
    pub age: Duration,
}

/// Snapshot the table and compute the rate of every channel at `now`
pub fn channel_stats(table: &ChannelTable, now: Instant) -> Vec<ChannelStats> {
    table
        .snapshot()
        .into_iter()
        .map(|mut record| {
            let rate = compute_rate(&mut record, now);
            let age = now.saturating_duration_since(record.last_seen_at);
            ChannelStats { record, rate, age }
        })
        .collect()
}

/// Sum of the rates of all channels
pub fn total_rate(stats: &[ChannelStats]) -> f64 {
    stats.iter().map(|s| s.rate).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(arrivals: &[Instant]) -> ChannelRecord {
        let table = ChannelTable::new();
        for &t in arrivals {
            table.upsert("X", t, 0, None);
        }
        table.get("X").unwrap()
    }

    #[test]
    fn test_only_trailing_second_counts() {
        let start = Instant::now();
        // 10 messages spread evenly over 2 s
        let arrivals: Vec<Instant> =
            (0..10).map(|i| start + Duration::from_millis(i * 2000 / 9)).collect();
        let last = *arrivals.last().unwrap();

        let mut record = record_with(&arrivals);
        // Arrivals at 1111, 1333 .. 2000 ms are within 1 s of the last one
        let expected = arrivals.iter().filter(|&&t| last - t < RATE_WINDOW).count();
        assert_eq!(expected, 5);
        assert_eq!(compute_rate(&mut record, last), expected as f64);
    }

    #[test]
    fn test_rate_is_idempotent_at_an_instant() {
        let start = Instant::now();
        let arrivals: Vec<Instant> =
            (0..5).map(|i| start + Duration::from_millis(i * 100)).collect();
        let mut record = record_with(&arrivals);
        let now = start + Duration::from_millis(700);

        let first = compute_rate(&mut record, now);
        let second = compute_rate(&mut record, now);
        assert_eq!(first, second);
        assert_eq!(first, 5.0);
    }

    #[test]
    fn test_rate_decays_to_zero() {
        let start = Instant::now();
        let mut record = record_with(&[start, start + Duration::from_millis(500)]);
        assert_eq!(compute_rate(&mut record, start + Duration::from_millis(1200)), 1.0);
        assert_eq!(compute_rate(&mut record, start + Duration::from_secs(2)), 0.0);
        assert_eq!(record.total_count, 2);
    }

    #[test]
    fn test_boundary_is_exclusive() {
        let start = Instant::now();
        let mut record = record_with(&[start]);
        assert_eq!(compute_rate(&mut record, start + RATE_WINDOW), 0.0);
    }

    #[test]
    fn test_channel_stats_reports_age() {
        let table = ChannelTable::new();
        let start = Instant::now();
        table.upsert("A", start, 0, None);
        table.upsert("B", start + Duration::from_millis(400), 0, None);

        let stats = channel_stats(&table, start + Duration::from_millis(500));
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].age, Duration::from_millis(500));
        assert_eq!(stats[1].age, Duration::from_millis(100));
        assert_eq!(total_rate(&stats), 2.0);
    }
}
