//! Per-channel state, written by the ingest loop and read by the renderers

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use dashmap::DashMap;

use crate::schema::DecodedMessage;
use crate::stats;

/// Type name recorded when no schema decodes a payload
pub const UNKNOWN_TYPE: &str = "unknown";

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRecord {
    pub name: String,
    /// Type of the last message, or [`UNKNOWN_TYPE`]
    pub inferred_type: String,
    pub last_seen_at: Instant,
    /// Arrivals inside the trailing rate window, oldest first
    pub arrival_timestamps: VecDeque<Instant>,
    pub total_count: u64,
    /// Only kept for detail channels
    pub last_decoded: Option<DecodedMessage>,
    pub last_size: usize,
}

impl ChannelRecord {
    fn new(name: &str, now: Instant) -> Self {
        Self {
            name: name.to_string(),
            inferred_type: UNKNOWN_TYPE.to_string(),
            last_seen_at: now,
            arrival_timestamps: VecDeque::new(),
            total_count: 0,
            last_decoded: None,
            last_size: 0,
        }
    }

    pub fn is_known_type(&self) -> bool {
        self.inferred_type != UNKNOWN_TYPE
    }
}

/// Channel state table keyed by channel name. Records are never removed.
#[derive(Debug, Default)]
pub struct ChannelTable {
    records: DashMap<String, ChannelRecord>,
    detail_channels: HashSet<String>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table that keeps the last decoded message of `detail_channels`
    pub fn with_detail_channels<I, S>(detail_channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            records: DashMap::new(),
            detail_channels: detail_channels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_detail_channel(&self, channel: &str) -> bool {
        self.detail_channels.contains(channel)
    }

    /// Record one received message. `decoded` is `None` when no schema matched.
    pub fn upsert(
        &self,
        channel: &str,
        timestamp: Instant,
        size: usize,
        decoded: Option<DecodedMessage>,
    ) {
        let keep_detail = self.is_detail_channel(channel);
        let mut record = self
            .records
            .entry(channel.to_string())
            .or_insert_with(|| ChannelRecord::new(channel, timestamp));

        record.arrival_timestamps.push_back(timestamp);
        stats::trim_window(&mut record.arrival_timestamps, timestamp);
        record.total_count += 1;
        record.last_seen_at = timestamp;
        record.last_size = size;

        match decoded {
            Some(message) => {
                record.inferred_type.clone_from(&message.type_name);
                if keep_detail {
                    record.last_decoded = Some(message);
                }
            }
            None => record.inferred_type = UNKNOWN_TYPE.to_string(),
        }
    }

    pub fn get(&self, channel: &str) -> Option<ChannelRecord> {
        self.records.get(channel).map(|r| r.value().clone())
    }

    /// Copy of every record, ordered by channel name
    pub fn snapshot(&self) -> Vec<ChannelRecord> {
        let mut records: Vec<ChannelRecord> =
            self.records.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldValue;
    use std::time::Duration;

    fn message(type_name: &str) -> DecodedMessage {
        DecodedMessage {
            type_name: type_name.to_string(),
            fields: vec![("utime".to_string(), FieldValue::Int(1))],
        }
    }

    #[test]
    fn test_first_message_creates_record() {
        let table = ChannelTable::new();
        let now = Instant::now();
        table.upsert("MBOT_IMU", now, 12, Some(message("mbot_imu_t")));

        let record = table.get("MBOT_IMU").unwrap();
        assert_eq!(record.total_count, 1);
        assert_eq!(record.inferred_type, "mbot_imu_t");
        assert_eq!(record.last_seen_at, now);
        assert_eq!(record.last_size, 12);
        assert_eq!(record.arrival_timestamps.len(), 1);
        // Not a detail channel
        assert!(record.last_decoded.is_none());
    }

    #[test]
    fn test_type_follows_last_message() {
        let table = ChannelTable::new();
        let start = Instant::now();
        table.upsert("X", start, 0, Some(message("a_t")));
        table.upsert("X", start + Duration::from_millis(1), 0, None);
        assert_eq!(table.get("X").unwrap().inferred_type, UNKNOWN_TYPE);
        table.upsert("X", start + Duration::from_millis(2), 0, Some(message("b_t")));
        assert_eq!(table.get("X").unwrap().inferred_type, "b_t");
    }

    #[test]
    fn test_detail_channels_keep_decoded_message() {
        let table = ChannelTable::with_detail_channels(["MBOT_IMU"]);
        let now = Instant::now();
        table.upsert("MBOT_IMU", now, 0, Some(message("mbot_imu_t")));
        table.upsert("LIDAR", now, 0, Some(message("lidar_t")));

        assert_eq!(table.get("MBOT_IMU").unwrap().last_decoded, Some(message("mbot_imu_t")));
        assert!(table.get("LIDAR").unwrap().last_decoded.is_none());

        // A failed decode keeps the previous snapshot
        table.upsert("MBOT_IMU", now, 0, None);
        assert!(table.get("MBOT_IMU").unwrap().last_decoded.is_some());
    }

    #[test]
    fn test_total_count_unaffected_by_trimming() {
        let table = ChannelTable::new();
        let start = Instant::now();
        for i in 0..20 {
            table.upsert("X", start + Duration::from_millis(250 * i), 0, None);
        }
        let record = table.get("X").unwrap();
        assert_eq!(record.total_count, 20);
        assert!(record.arrival_timestamps.len() <= 4);
    }

    #[test]
    fn test_snapshot_is_sorted_copy() {
        let table = ChannelTable::new();
        let now = Instant::now();
        for name in ["MBOT_VEL", "LIDAR", "MBOT_IMU"] {
            table.upsert(name, now, 0, None);
        }
        let snapshot = table.snapshot();
        let names: Vec<_> = snapshot.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["LIDAR", "MBOT_IMU", "MBOT_VEL"]);

        table.upsert("LIDAR", now, 0, None);
        assert_eq!(snapshot[0].total_count, 1);
        assert_eq!(table.get("LIDAR").unwrap().total_count, 2);
    }

    #[test]
    fn test_concurrent_writer_and_reader() {
        let table = std::sync::Arc::new(ChannelTable::new());
        let writer = {
            let table = table.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    table.upsert("X", Instant::now(), 0, None);
                }
            })
        };
        let mut last = 0;
        for _ in 0..100 {
            if let Some(record) = table.snapshot().into_iter().next() {
                assert!(record.total_count >= last);
                last = record.total_count;
            }
        }
        writer.join().unwrap();
        assert_eq!(table.get("X").unwrap().total_count, 1000);
    }
}
