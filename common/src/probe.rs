//! Host probes: CPU temperature and attached USB devices

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use sysinfo::{ComponentExt, System, SystemExt};
use thiserror::Error;
use tracing::debug;

const SYSFS_USB_DEVICES: &str = "/sys/bus/usb/devices";
const VCGENCMD: &str = "vcgencmd";

/// Sensor labels preferred for the CPU temperature, in order
const CPU_SENSOR_LABELS: &[&str] = &["cpu", "soc", "package", "k10temp", "coretemp"];

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no temperature sensor found")]
    NoSensor,

    #[error("failed to run {command}: {source}")]
    Command {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("unexpected output from {command}: '{output}'")]
    UnexpectedOutput { command: String, output: String },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// CPU temperature in degrees Celsius.
///
/// Uses the hardware sensors when the platform exposes them and falls back to
/// the Raspberry Pi firmware tool.
pub fn read_cpu_temperature() -> Result<f32, ProbeError> {
    match sensor_temperature() {
        Some(celsius) => Ok(celsius),
        None => {
            debug!("No CPU sensor via sysinfo, trying {VCGENCMD}");
            vcgencmd_temperature()
        }
    }
}

fn sensor_temperature() -> Option<f32> {
    let mut system = System::new();
    system.refresh_components_list();
    let readings: Vec<(String, f32)> = system
        .components()
        .iter()
        .map(|c| (c.label().to_lowercase(), c.temperature()))
        .filter(|(_, celsius)| celsius.is_finite() && *celsius > 0.0)
        .collect();

    CPU_SENSOR_LABELS
        .iter()
        .find_map(|wanted| readings.iter().find(|(label, _)| label.contains(wanted)))
        .or_else(|| readings.first())
        .map(|(_, celsius)| *celsius)
}

fn vcgencmd_temperature() -> Result<f32, ProbeError> {
    let output = Command::new(VCGENCMD)
        .arg("measure_temp")
        .output()
        .map_err(|source| ProbeError::Command {
            command: VCGENCMD.to_string(),
            source,
        })?;
    parse_measure_temp(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `vcgencmd measure_temp` output such as `temp=47.2'C`
pub fn parse_measure_temp(output: &str) -> Result<f32, ProbeError> {
    let unexpected = || ProbeError::UnexpectedOutput {
        command: format!("{VCGENCMD} measure_temp"),
        output: output.trim().to_string(),
    };
    let (_, value) = output.trim().split_once('=').ok_or_else(unexpected)?;
    let number = value.split('\'').next().ok_or_else(unexpected)?;
    number.trim().parse().map_err(|_| unexpected())
}

/// One entry of the USB device tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsbDevice {
    pub bus_id: String,
    pub vendor_id: String,
    pub product_id: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl UsbDevice {
    /// Text the device fragments are matched against
    pub fn descriptor(&self) -> String {
        let mut text = format!("{}:{}", self.vendor_id, self.product_id);
        for part in [&self.manufacturer, &self.product].into_iter().flatten() {
            text.push(' ');
            text.push_str(part);
        }
        text
    }

    /// Case-insensitive substring match against any of `fragments`
    pub fn matches_any(&self, fragments: &[String]) -> bool {
        let descriptor = self.descriptor().to_lowercase();
        fragments.iter().any(|f| descriptor.contains(&f.to_lowercase()))
    }
}

pub fn list_usb_devices() -> Result<Vec<UsbDevice>, ProbeError> {
    list_usb_devices_in(Path::new(SYSFS_USB_DEVICES))
}

/// Read USB devices from a sysfs-style directory
pub fn list_usb_devices_in(root: &Path) -> Result<Vec<UsbDevice>, ProbeError> {
    let entries = fs::read_dir(root).map_err(|source| ProbeError::Read {
        path: root.to_path_buf(),
        source,
    })?;

    let mut devices = Vec::new();
    for entry in entries.flatten() {
        let dir = entry.path();
        // Interfaces have no idVendor and are skipped
        let Some(vendor_id) = read_attribute(&dir, "idVendor") else {
            continue;
        };
        devices.push(UsbDevice {
            bus_id: entry.file_name().to_string_lossy().into_owned(),
            vendor_id,
            product_id: read_attribute(&dir, "idProduct").unwrap_or_default(),
            manufacturer: read_attribute(&dir, "manufacturer"),
            product: read_attribute(&dir, "product"),
        });
    }
    devices.sort_by(|a, b| a.bus_id.cmp(&b.bus_id));
    Ok(devices)
}

fn read_attribute(dir: &Path, name: &str) -> Option<String> {
    fs::read_to_string(dir.join(name))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsbConnectivity {
    pub control_board: bool,
    pub serial_bridge: bool,
}

impl UsbConnectivity {
    pub fn from_devices(
        devices: &[UsbDevice],
        control_board_fragments: &[String],
        serial_bridge_fragments: &[String],
    ) -> Self {
        Self {
            control_board: devices.iter().any(|d| d.matches_any(control_board_fragments)),
            serial_bridge: devices.iter().any(|d| d.matches_any(serial_bridge_fragments)),
        }
    }
}
