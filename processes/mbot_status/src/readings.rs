//! Sensor channels decoded into subsystem readings

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, error};

use mbot_common::configuration::StatusConfig;
use mbot_common::health::{Attitude, DeviceStatus, RangeScan, SubsystemStatus};
use mbot_common::schema::DecodedMessage;
use mbot_common::transport::{SubscriptionId, Transport, TransportError};
use mbot_common::SchemaRegistry;

pub const ANALOG_TYPE: &str = "mbot_analog_t";
pub const IMU_TYPE: &str = "mbot_imu_t";
pub const LIDAR_TYPE: &str = "lidar_t";

/// Subsystem state written by the ingest loop and read by the render loop
pub type SharedStatus = Arc<Mutex<DeviceStatus>>;

/// Lock the shared status. A panic elsewhere never leaves a record half
/// written, so a poisoned lock is still usable.
pub fn lock(status: &SharedStatus) -> MutexGuard<'_, DeviceStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn battery_voltage(msg: &DecodedMessage, index: usize) -> Option<f32> {
    let volts = msg.get("volts")?.as_array()?;
    volts.get(index)?.as_f64().map(|v| v as f32)
}

pub fn attitude(msg: &DecodedMessage) -> Option<Attitude> {
    let [roll, pitch, yaw] = msg.get("angles_rpy")?.as_array()? else {
        return None;
    };
    Some(Attitude {
        roll: roll.as_f64()? as f32,
        pitch: pitch.as_f64()? as f32,
        yaw: yaw.as_f64()? as f32,
    })
}

pub fn range_scan(msg: &DecodedMessage) -> Option<RangeScan> {
    let count = msg.get("num_ranges")?.as_i64()?;
    usize::try_from(count).ok().map(RangeScan)
}

fn battery(status: &mut DeviceStatus) -> &mut SubsystemStatus<f32> {
    &mut status.battery
}

fn imu(status: &mut DeviceStatus) -> &mut SubsystemStatus<Attitude> {
    &mut status.imu
}

fn lidar(status: &mut DeviceStatus) -> &mut SubsystemStatus<RangeScan> {
    &mut status.lidar
}

/// Subscribe one sensor channel. Without a schema for `type_name` the
/// subsystem is marked unavailable and nothing is subscribed.
fn subscribe_sensor<T, F>(
    transport: &mut dyn Transport,
    channel: &str,
    type_name: &'static str,
    registry: &Arc<SchemaRegistry>,
    status: &SharedStatus,
    select: fn(&mut DeviceStatus) -> &mut SubsystemStatus<T>,
    extract: F,
) -> Result<Option<SubscriptionId>, TransportError>
where
    T: 'static,
    F: Fn(&DecodedMessage) -> Option<T> + Send + 'static,
{
    if registry.get(type_name).is_none() {
        error!(channel, "No schema for {type_name}, readings not available");
        let mut guard = lock(status);
        let subsystem = select(&mut guard);
        *subsystem = SubsystemStatus::unavailable(subsystem.name);
        return Ok(None);
    }

    let registry = registry.clone();
    let status = status.clone();
    let id = transport.subscribe(
        &regex::escape(channel),
        Box::new(move |channel: &str, payload: &[u8]| {
            let Some(schema) = registry.get(type_name) else {
                return;
            };
            let msg = match schema.try_decode(payload) {
                Ok(msg) => msg,
                Err(e) => {
                    debug!(channel, "Not a {type_name}: {e}");
                    return;
                }
            };
            match extract(&msg) {
                Some(value) => select(&mut lock(&status)).update(value, Instant::now()),
                None => debug!(channel, "{type_name} without the expected fields"),
            }
        }),
    )?;
    Ok(Some(id))
}

/// Route the battery, IMU and lidar channels into `status`
pub fn subscribe_sensors(
    transport: &mut dyn Transport,
    registry: Arc<SchemaRegistry>,
    status: SharedStatus,
    config: &StatusConfig,
) -> Result<Vec<SubscriptionId>, TransportError> {
    let index = config.battery_volts_index;
    let subscriptions = [
        subscribe_sensor(
            transport,
            &config.battery_channel,
            ANALOG_TYPE,
            &registry,
            &status,
            battery,
            move |msg| battery_voltage(msg, index),
        )?,
        subscribe_sensor(
            transport,
            &config.imu_channel,
            IMU_TYPE,
            &registry,
            &status,
            imu,
            attitude,
        )?,
        subscribe_sensor(
            transport,
            &config.lidar_channel,
            LIDAR_TYPE,
            &registry,
            &status,
            lidar,
            range_scan,
        )?,
    ];
    Ok(subscriptions.into_iter().flatten().collect())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use mbot_common::schema::{DecodedMessage, FieldValue};

    fn floats(values: &[f64]) -> FieldValue {
        FieldValue::Array(values.iter().map(|v| FieldValue::Float(*v)).collect())
    }

    fn field(name: &str, value: FieldValue) -> (String, FieldValue) {
        (name.to_string(), value)
    }

    pub fn analog(volts: f64) -> DecodedMessage {
        DecodedMessage {
            type_name: "mbot_analog_t".to_string(),
            fields: vec![
                field("utime", FieldValue::Int(0)),
                field("raw", FieldValue::Array(vec![FieldValue::Int(0); 6])),
                field("volts", floats(&[0.0, 0.0, 0.0, volts, 0.0, 0.0])),
            ],
        }
    }

    pub fn imu(roll: f64, pitch: f64, yaw: f64) -> DecodedMessage {
        DecodedMessage {
            type_name: "mbot_imu_t".to_string(),
            fields: vec![
                field("utime", FieldValue::Int(0)),
                field("gyro", floats(&[0.0; 3])),
                field("accel", floats(&[0.0, 0.0, 9.81])),
                field("mag", floats(&[0.0; 3])),
                field("angles_rpy", floats(&[roll, pitch, yaw])),
                field("angles_quat", floats(&[1.0, 0.0, 0.0, 0.0])),
                field("temp", FieldValue::Float(30.0)),
            ],
        }
    }

    pub fn lidar(count: usize) -> DecodedMessage {
        DecodedMessage {
            type_name: "lidar_t".to_string(),
            fields: vec![
                field("utime", FieldValue::Int(0)),
                field("num_ranges", FieldValue::Int(count as i64)),
                field("ranges", floats(&vec![1.0; count])),
                field("thetas", floats(&vec![0.0; count])),
                field("times", FieldValue::Array(vec![FieldValue::Int(0); count])),
                field("intensities", floats(&vec![0.0; count])),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbot_common::health::Reading;
    use mbot_common::transport::MemoryTransport;
    use mbot_common::TelemetryConfig;
    use std::time::Duration;

    fn config() -> StatusConfig {
        TelemetryConfig::load(None).unwrap().status
    }

    fn drain(transport: &mut MemoryTransport) {
        while transport.poll_once(Duration::from_millis(10)).unwrap() {}
    }

    #[test]
    fn test_extractors() {
        assert_eq!(battery_voltage(&fixtures::analog(7.4), 3), Some(7.4));
        assert_eq!(battery_voltage(&fixtures::analog(7.4), 6), None);
        assert_eq!(
            attitude(&fixtures::imu(0.5, 0.0, -0.25)),
            Some(Attitude { roll: 0.5, pitch: 0.0, yaw: -0.25 })
        );
        assert_eq!(range_scan(&fixtures::lidar(3)), Some(RangeScan(3)));
        assert_eq!(attitude(&fixtures::analog(1.0)), None);
    }

    #[test]
    fn test_sensor_channels_update_status() {
        let registry = Arc::new(SchemaRegistry::builtin().unwrap());
        let status = SharedStatus::default();
        let mut memq = MemoryTransport::new();
        let publisher = memq.publisher();
        let ids = subscribe_sensors(&mut memq, registry.clone(), status.clone(), &config())
            .unwrap();
        assert_eq!(ids.len(), 3);

        let analog = registry.encode(ANALOG_TYPE, &fixtures::analog(12.1)).unwrap();
        let imu = registry.encode(IMU_TYPE, &fixtures::imu(0.0, 0.1, 0.0)).unwrap();
        let lidar = registry.encode(LIDAR_TYPE, &fixtures::lidar(260)).unwrap();
        publisher.publish("MBOT_ANALOG_IN", &analog).unwrap();
        publisher.publish("MBOT_IMU", &imu).unwrap();
        publisher.publish("LIDAR", &lidar).unwrap();
        drain(&mut memq);

        let status = lock(&status);
        assert_eq!(status.battery.reading, Reading::Value(12.1));
        assert_eq!(status.imu.reading.value().map(|a| a.pitch), Some(0.1));
        assert_eq!(status.lidar.reading, Reading::Value(RangeScan(260)));
    }

    #[test]
    fn test_undecodable_payload_leaves_status_unset() {
        let registry = Arc::new(SchemaRegistry::builtin().unwrap());
        let status = SharedStatus::default();
        let mut memq = MemoryTransport::new();
        let publisher = memq.publisher();
        subscribe_sensors(&mut memq, registry, status.clone(), &config()).unwrap();

        publisher.publish("MBOT_ANALOG_IN", b"garbage").unwrap();
        drain(&mut memq);
        let status = lock(&status);
        assert_eq!(status.battery.reading, Reading::Unset);
        assert!(status.battery.last_update_at.is_none());
    }

    #[test]
    fn test_missing_schemas_mark_unavailable() {
        let status = SharedStatus::default();
        let mut memq = MemoryTransport::new();
        let ids =
            subscribe_sensors(&mut memq, Arc::new(SchemaRegistry::new()), status.clone(), &config())
                .unwrap();
        assert!(ids.is_empty());

        let status = lock(&status);
        assert_eq!(status.battery.reading, Reading::Unavailable);
        assert_eq!(status.imu.reading, Reading::Unavailable);
        assert_eq!(status.lidar.reading, Reading::Unavailable);
    }
}
