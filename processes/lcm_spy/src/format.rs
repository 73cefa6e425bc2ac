//! Text formatting shared by the terminal views and the plain-text snapshot

use std::fmt::Write;
use std::time::Duration;

use mbot_common::stats::ChannelStats;

const COL_CHANNEL: usize = 20;
const COL_TYPE: usize = 20;
const COL_RATE: usize = 10;
const COL_FIELD: usize = 20;

/// Format large numbers with K/M suffixes
pub fn format_count(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

/// Format the time since a channel was last seen
pub fn format_age(d: Duration) -> String {
    let millis = d.as_millis();
    if millis < 1_000 {
        format!("{millis}ms")
    } else if millis < 60_000 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}m{:02}s", millis / 60_000, (millis / 1_000) % 60)
    }
}

pub fn format_rate(rate: f64) -> String {
    format!("{rate:.2}")
}

pub fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MiB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

/// Cut `s` to at most `max_chars` characters, marking the cut
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

/// Plain-text rendering of a snapshot: the channel table, then the decoded
/// fields of every detail channel in `detail_order`
pub fn plain_text(channels: &[ChannelStats], detail_order: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<COL_CHANNEL$} {:<COL_TYPE$} {:<COL_RATE$} {:<10}",
        "Channel", "Type", "Rate", "Msgs Rcvd"
    );
    let _ = writeln!(out, "{}", "=".repeat(60));
    for stats in channels {
        let record = &stats.record;
        let _ = writeln!(
            out,
            "{:<COL_CHANNEL$} {:<COL_TYPE$} {:<COL_RATE$} {:<10}",
            record.name,
            record.inferred_type,
            format_rate(stats.rate),
            record.total_count
        );
    }

    for channel in detail_order {
        let decoded = channels
            .iter()
            .find(|s| &s.record.name == channel)
            .and_then(|s| s.record.last_decoded.as_ref());
        let Some(decoded) = decoded else {
            continue;
        };
        let _ = writeln!(out, "\nDecoded message on channel {channel}:");
        let _ = writeln!(out, "{:<COL_FIELD$} {:<20}", "Field", "Value");
        let _ = writeln!(out, "{}", "=".repeat(40));
        for (field, value) in decoded.flatten() {
            let _ = writeln!(out, "{field:<COL_FIELD$} {value}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbot_common::schema::{DecodedMessage, FieldValue};
    use mbot_common::ChannelTable;
    use std::time::Instant;

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_500), "1.5K");
        assert_eq!(format_count(2_500_000), "2.5M");
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(Duration::from_millis(250)), "250ms");
        assert_eq!(format_age(Duration::from_millis(2_500)), "2.5s");
        assert_eq!(format_age(Duration::from_secs(125)), "2m05s");
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("MBOT_IMU", 10), "MBOT_IMU");
        assert_eq!(truncate("MBOT_APRILTAG_ARRAY", 8), "MBOT_AP…");
        assert_eq!(truncate("ångström", 4), "ång…");
    }

    #[test]
    fn test_plain_text_snapshot() {
        let table = ChannelTable::with_detail_channels(["MBOT_VEL"]);
        let now = Instant::now();
        let velocity = DecodedMessage {
            type_name: "twist2D_t".to_string(),
            fields: vec![
                ("utime".to_string(), FieldValue::Int(7)),
                ("vx".to_string(), FieldValue::Float(0.25)),
            ],
        };
        table.upsert("MBOT_VEL", now, 24, Some(velocity));
        table.upsert("X", now, 3, None);
        table.upsert("X", now, 3, None);

        let stats = mbot_common::stats::channel_stats(&table, now);
        let text = plain_text(&stats, &["MBOT_VEL".to_string(), "MISSING".to_string()]);
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].starts_with("Channel "));
        assert!(lines[2].starts_with("MBOT_VEL             twist2D_t            1.00       1"));
        assert!(lines[3].starts_with("X                    unknown              2.00       2"));
        assert!(text.contains("Decoded message on channel MBOT_VEL:"));
        assert!(text.contains("vx                   0.2500"));
        assert!(!text.contains("MISSING"));
    }
}
