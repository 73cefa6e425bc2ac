//! Subsystem health: staleness watchdog and value predicates
//!
//! Each monitored subsystem keeps its last reading and when it arrived. A
//! reading older than the staleness threshold is reset to [`Reading::Unset`]
//! the next time health is computed, so a disconnected sensor can never keep
//! reporting its last good value.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::info;

use crate::configuration::StatusConfig;

/// Value printed in place of a reading that has not arrived
pub const SENTINEL_UNSET: f64 = -1.0;
/// Value printed when the reading cannot be decoded at all
pub const SENTINEL_UNAVAILABLE: f64 = -2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading<T> {
    /// Nothing received, or reset by the watchdog
    Unset,
    /// No decoder for the channel
    Unavailable,
    Value(T),
}

impl<T> Reading<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Reading::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl Reading<f32> {
    /// The reading as a number, using the negative sentinels
    pub fn or_sentinel(&self) -> f64 {
        match self {
            Reading::Unset => SENTINEL_UNSET,
            Reading::Unavailable => SENTINEL_UNAVAILABLE,
            Reading::Value(v) => *v as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImuCheck {
    /// At least one of roll, pitch and yaw is not zero
    NonZero,
    /// At least one of roll, pitch and yaw is above zero
    Positive,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VoltageNote {
    /// Upper bound (exclusive); the last band usually has none
    #[serde(default)]
    pub below: Option<f32>,
    pub note: String,
}

/// Interpretation of a battery voltage, from the first matching band
pub fn annotate_voltage(notes: &[VoltageNote], volts: f32) -> &str {
    notes
        .iter()
        .find(|band| band.below.is_none_or(|below| volts < below))
        .map(|band| band.note.as_str())
        .unwrap_or("")
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthPolicy {
    pub staleness: Duration,
    pub imu_check: ImuCheck,
    pub lidar_min_ranges: usize,
    pub voltage_notes: Vec<VoltageNote>,
}

impl From<&StatusConfig> for HealthPolicy {
    fn from(config: &StatusConfig) -> Self {
        Self {
            staleness: config.staleness_threshold(),
            imu_check: config.imu_check,
            lidar_min_ranges: config.lidar_min_ranges,
            voltage_notes: config.voltage_notes.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    /// The subsystem has no pass/fail test
    NotApplicable,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
            Verdict::NotApplicable => write!(f, "-"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubsystemReport {
    pub name: &'static str,
    pub connected: bool,
    pub verdict: Verdict,
    pub note: String,
}

/// A reading type with a health predicate
pub trait Assess {
    fn assess(&self, policy: &HealthPolicy) -> (Verdict, String);
}

/// Battery voltage in volts
impl Assess for f32 {
    fn assess(&self, policy: &HealthPolicy) -> (Verdict, String) {
        let note = annotate_voltage(&policy.voltage_notes, *self);
        (Verdict::NotApplicable, format!("{self:.2} V, {note}"))
    }
}

/// Orientation from the inertial sensor, in radians
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Attitude {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl Assess for Attitude {
    fn assess(&self, policy: &HealthPolicy) -> (Verdict, String) {
        let angles = [self.roll, self.pitch, self.yaw];
        let pass = match policy.imu_check {
            ImuCheck::NonZero => angles.iter().any(|a| *a != 0.0),
            ImuCheck::Positive => angles.iter().any(|a| *a > 0.0),
        };
        let note = format!(
            "roll {:.3}, pitch {:.3}, yaw {:.3}",
            self.roll, self.pitch, self.yaw
        );
        (if pass { Verdict::Pass } else { Verdict::Fail }, note)
    }
}

/// Number of samples in one range scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeScan(pub usize);

impl Assess for RangeScan {
    fn assess(&self, policy: &HealthPolicy) -> (Verdict, String) {
        let verdict = if self.0 >= policy.lidar_min_ranges {
            Verdict::Pass
        } else {
            Verdict::Fail
        };
        (verdict, format!("{} ranges (need {})", self.0, policy.lidar_min_ranges))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubsystemStatus<T> {
    pub name: &'static str,
    pub reading: Reading<T>,
    pub last_update_at: Option<Instant>,
}

impl<T> SubsystemStatus<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            reading: Reading::Unset,
            last_update_at: None,
        }
    }

    /// A subsystem whose channel cannot be decoded
    pub fn unavailable(name: &'static str) -> Self {
        Self {
            name,
            reading: Reading::Unavailable,
            last_update_at: None,
        }
    }

    pub fn update(&mut self, value: T, now: Instant) {
        self.reading = Reading::Value(value);
        self.last_update_at = Some(now);
    }

    pub fn is_connected(&self, now: Instant, threshold: Duration) -> bool {
        self.last_update_at
            .is_some_and(|at| now.saturating_duration_since(at) < threshold)
    }

    /// Reset a stale reading to [`Reading::Unset`]. Returns whether it is connected.
    pub fn watchdog(&mut self, now: Instant, threshold: Duration) -> bool {
        let connected = self.is_connected(now, threshold);
        if !connected && matches!(self.reading, Reading::Value(_)) {
            info!(subsystem = self.name, "No update within {threshold:?}, resetting reading");
            self.reading = Reading::Unset;
        }
        connected
    }
}

/// Connectivity and predicate result for one subsystem at `now`
pub fn compute_health<T: Assess>(
    status: &mut SubsystemStatus<T>,
    now: Instant,
    policy: &HealthPolicy,
) -> SubsystemReport {
    let connected = status.watchdog(now, policy.staleness);
    let (verdict, note) = match (&status.reading, connected) {
        (Reading::Value(value), true) => value.assess(policy),
        (Reading::Unavailable, _) => (Verdict::Fail, "decoder not available".to_string()),
        _ => (Verdict::Fail, "no data received".to_string()),
    };
    SubsystemReport {
        name: status.name,
        connected,
        verdict,
        note,
    }
}

/// Everything the status tool tracks
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    pub battery: SubsystemStatus<f32>,
    pub imu: SubsystemStatus<Attitude>,
    pub lidar: SubsystemStatus<RangeScan>,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            battery: SubsystemStatus::new("battery"),
            imu: SubsystemStatus::new("imu"),
            lidar: SubsystemStatus::new("lidar"),
        }
    }
}

impl DeviceStatus {
    /// Health of every subsystem, resetting stale readings
    pub fn reports(&mut self, now: Instant, policy: &HealthPolicy) -> Vec<SubsystemReport> {
        vec![
            compute_health(&mut self.imu, now, policy),
            compute_health(&mut self.lidar, now, policy),
            compute_health(&mut self.battery, now, policy),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> HealthPolicy {
        HealthPolicy {
            staleness: Duration::from_secs(1),
            imu_check: ImuCheck::NonZero,
            lidar_min_ranges: 250,
            voltage_notes: vec![
                VoltageNote { below: Some(0.0), note: "not available".into() },
                VoltageNote { below: Some(6.0), note: "too low".into() },
                VoltageNote { below: Some(10.5), note: "low".into() },
                VoltageNote { below: Some(13.0), note: "OK".into() },
                VoltageNote { below: None, note: "high".into() },
            ],
        }
    }

    #[test]
    fn test_stale_reading_is_reset() {
        let start = Instant::now();
        let mut battery = SubsystemStatus::new("battery");
        battery.update(7.4f32, start);

        let report = compute_health(&mut battery, start + Duration::from_millis(1500), &policy());
        assert!(!report.connected);
        assert_eq!(battery.reading, Reading::Unset);
        assert_eq!(battery.reading.or_sentinel(), SENTINEL_UNSET);
    }

    #[test]
    fn test_health_is_idempotent() {
        let start = Instant::now();
        let mut imu = SubsystemStatus::new("imu");
        imu.update(Attitude { roll: 0.1, pitch: 0.0, yaw: 0.0 }, start);

        for now in [start + Duration::from_millis(200), start + Duration::from_secs(3)] {
            let first = compute_health(&mut imu, now, &policy());
            let second = compute_health(&mut imu, now, &policy());
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_never_received_is_failed() {
        let mut lidar: SubsystemStatus<RangeScan> = SubsystemStatus::new("lidar");
        let report = compute_health(&mut lidar, Instant::now(), &policy());
        assert!(!report.connected);
        assert_eq!(report.verdict, Verdict::Fail);

        let mut missing: SubsystemStatus<f32> = SubsystemStatus::unavailable("battery");
        let report = compute_health(&mut missing, Instant::now(), &policy());
        assert_eq!(report.verdict, Verdict::Fail);
        assert_eq!(missing.reading.or_sentinel(), SENTINEL_UNAVAILABLE);
    }

    #[test]
    fn test_imu_predicates() {
        let level = Attitude::default();
        let tilted = Attitude { roll: -0.2, pitch: 0.0, yaw: 0.0 };
        let mut strict = policy();
        strict.imu_check = ImuCheck::Positive;

        assert_eq!(level.assess(&policy()).0, Verdict::Fail);
        assert_eq!(tilted.assess(&policy()).0, Verdict::Pass);
        assert_eq!(tilted.assess(&strict).0, Verdict::Fail);
        assert_eq!(Attitude { yaw: 1.0, ..level }.assess(&strict).0, Verdict::Pass);
    }

    #[test]
    fn test_lidar_threshold() {
        assert_eq!(RangeScan(249).assess(&policy()).0, Verdict::Fail);
        assert_eq!(RangeScan(250).assess(&policy()).0, Verdict::Pass);
    }

    #[test]
    fn test_voltage_annotation() {
        let notes = policy().voltage_notes;
        assert_eq!(annotate_voltage(&notes, -1.0), "not available");
        assert_eq!(annotate_voltage(&notes, 5.9), "too low");
        assert_eq!(annotate_voltage(&notes, 7.4), "low");
        assert_eq!(annotate_voltage(&notes, 12.0), "OK");
        assert_eq!(annotate_voltage(&notes, 13.0), "high");
        assert_eq!(annotate_voltage(&[], 12.0), "");
    }

    #[test]
    fn test_battery_has_no_verdict() {
        let (verdict, note) = 12.1f32.assess(&policy());
        assert_eq!(verdict, Verdict::NotApplicable);
        assert_eq!(note, "12.10 V, OK");
    }
}
