//! Status snapshots and their text rendering

use std::fmt::Write;
use std::time::Instant;

use tracing::warn;

use mbot_common::configuration::StatusConfig;
use mbot_common::health::{
    annotate_voltage, HealthPolicy, Reading, SubsystemReport, Verdict, SENTINEL_UNSET,
};
use mbot_common::probe::{self, ProbeError, UsbConnectivity, UsbDevice};

use crate::cli::Topic;
use crate::readings::{lock, SharedStatus};

/// Host-side readings that do not come from the bus
pub trait HostProbe {
    fn cpu_temperature(&self) -> Result<f32, ProbeError>;
    fn usb_devices(&self) -> Result<Vec<UsbDevice>, ProbeError>;
}

/// Probes of the machine the tool runs on
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn cpu_temperature(&self) -> Result<f32, ProbeError> {
        probe::read_cpu_temperature()
    }

    fn usb_devices(&self) -> Result<Vec<UsbDevice>, ProbeError> {
        probe::list_usb_devices()
    }
}

/// Everything one status block shows, taken at a single instant
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub battery: Reading<f32>,
    pub battery_note: String,
    /// `None` when the probe failed or the topic does not need it
    pub temperature: Option<f32>,
    pub reports: Vec<SubsystemReport>,
    pub usb: UsbConnectivity,
    pub usb_devices: Vec<String>,
}

pub struct StatusMonitor {
    status: SharedStatus,
    policy: HealthPolicy,
    control_board_fragments: Vec<String>,
    serial_bridge_fragments: Vec<String>,
}

impl StatusMonitor {
    pub fn new(status: SharedStatus, config: &StatusConfig) -> Self {
        Self {
            status,
            policy: HealthPolicy::from(config),
            control_board_fragments: config.control_board_fragments.clone(),
            serial_bridge_fragments: config.serial_bridge_fragments.clone(),
        }
    }

    /// Whether the bus readings `topic` shows have all arrived
    pub fn is_ready(&self, topic: Option<Topic>) -> bool {
        let status = lock(&self.status);
        let battery = !matches!(status.battery.reading, Reading::Unset);
        match topic {
            None | Some(Topic::Battery) => battery,
            Some(Topic::Temperature) => true,
            Some(Topic::Test) => {
                battery
                    && !matches!(status.imu.reading, Reading::Unset)
                    && !matches!(status.lidar.reading, Reading::Unset)
            }
        }
    }

    /// Run the health checks at `now` and probe the host for what `topic` needs
    pub fn sample(
        &self,
        probe: &dyn HostProbe,
        topic: Option<Topic>,
        now: Instant,
    ) -> StatusSnapshot {
        // Hold the lock for the health pass only
        let (reports, battery) = {
            let mut status = lock(&self.status);
            let reports = status.reports(now, &self.policy);
            (reports, status.battery.reading)
        };
        let battery_note =
            annotate_voltage(&self.policy.voltage_notes, battery.or_sentinel() as f32).to_string();

        let temperature = match topic {
            None | Some(Topic::Temperature) => match probe.cpu_temperature() {
                Ok(celsius) => Some(celsius),
                Err(e) => {
                    warn!("CPU temperature not available: {e}");
                    None
                }
            },
            _ => None,
        };

        let devices = if topic == Some(Topic::Test) {
            probe.usb_devices().unwrap_or_else(|e| {
                warn!("USB devices not available: {e}");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        StatusSnapshot {
            battery,
            battery_note,
            temperature,
            reports,
            usb: UsbConnectivity::from_devices(
                &devices,
                &self.control_board_fragments,
                &self.serial_bridge_fragments,
            ),
            usb_devices: devices
                .iter()
                .map(|d| format!("{} {}", d.bus_id, d.descriptor()))
                .collect(),
        }
    }
}

fn label(subsystem: &str) -> &str {
    match subsystem {
        "imu" => "IMU",
        "lidar" => "Lidar",
        "battery" => "Battery",
        other => other,
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn write_row(out: &mut String, name: &str, connected: &str, verdict: &str, note: &str) {
    let _ = writeln!(out, "{name:<15}{connected:<11}{verdict:<8}{note}");
}

fn usb_row(out: &mut String, name: &str, found: bool) {
    let (verdict, note) = if found {
        (Verdict::Pass, "USB device found")
    } else {
        (Verdict::Fail, "no matching USB device")
    };
    write_row(out, name, yes_no(found), &verdict.to_string(), note);
}

/// Format one status block for `topic`
pub fn format_status(snapshot: &StatusSnapshot, topic: Option<Topic>, verbose: bool) -> String {
    let mut out = String::new();
    let volts = snapshot.battery.or_sentinel();
    let celsius = snapshot.temperature.map_or(SENTINEL_UNSET, f64::from);

    match topic {
        None => {
            let _ = writeln!(out, "Battery Voltage: {volts:.2} V");
            let _ = writeln!(out, "Temperature: {celsius:.2} °C");
        }
        Some(Topic::Battery) => {
            let _ = write!(out, "Battery Voltage: {volts:.2} V");
            if verbose {
                let _ = write!(out, " ({})", snapshot.battery_note);
            }
            out.push('\n');
        }
        Some(Topic::Temperature) => {
            let _ = writeln!(out, "Temperature: {celsius:.2} °C");
        }
        Some(Topic::Test) => {
            write_row(&mut out, "Subsystem", "Connected", "Result", "Notes");
            for report in &snapshot.reports {
                write_row(
                    &mut out,
                    label(report.name),
                    yes_no(report.connected),
                    &report.verdict.to_string(),
                    &report.note,
                );
            }
            usb_row(&mut out, "Control board", snapshot.usb.control_board);
            usb_row(&mut out, "Serial bridge", snapshot.usb.serial_bridge);

            if verbose {
                let _ = writeln!(out, "\nUSB devices:");
                if snapshot.usb_devices.is_empty() {
                    let _ = writeln!(out, "  (none)");
                }
                for device in &snapshot.usb_devices {
                    let _ = writeln!(out, "  {device}");
                }
            }
        }
    }
    out
}
