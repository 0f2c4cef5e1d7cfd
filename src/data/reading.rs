use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Number of numeric sensor channels carried by every reading.
pub const CHANNEL_COUNT: usize = 7;

/// One of the numeric sensor signals, in canonical column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    AccelX,
    AccelY,
    AccelZ,
    GyroX,
    GyroY,
    GyroZ,
    LidarRange,
}

impl Channel {
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::AccelX,
        Channel::AccelY,
        Channel::AccelZ,
        Channel::GyroX,
        Channel::GyroY,
        Channel::GyroZ,
        Channel::LidarRange,
    ];

    /// Document field name of the channel.
    pub fn name(self) -> &'static str {
        match self {
            Channel::AccelX => "accel_x",
            Channel::AccelY => "accel_y",
            Channel::AccelZ => "accel_z",
            Channel::GyroX => "gyro_x",
            Channel::GyroY => "gyro_y",
            Channel::GyroZ => "gyro_z",
            Channel::LidarRange => "lidar_range",
        }
    }

    /// Column position of the channel inside `Reading::values`.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single timestamped observation from the robot.
///
/// Stored documents are flat: `{timestamp, accel_x, ..., lidar_range, is_anomaly}`.
/// Extra fields such as a store-assigned `_id` are ignored, and the label
/// accepts both `0/1` and `true/false`. A channel that is `null` or absent reads
/// as `NaN`; the preprocessor drops such rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "ReadingDoc", into = "ReadingDoc")]
pub struct Reading {
    /// Seconds offset from the start of the recording.
    pub timestamp: f64,
    pub values: [f64; CHANNEL_COUNT],
    pub is_anomaly: Option<bool>,
}

impl Reading {
    pub fn new(timestamp: f64, values: [f64; CHANNEL_COUNT]) -> Self {
        Reading { timestamp, values, is_anomaly: None }
    }

    pub fn with_label(mut self, is_anomaly: bool) -> Self {
        self.is_anomaly = Some(is_anomaly);
        self
    }

    pub fn value(&self, channel: Channel) -> f64 {
        self.values[channel.index()]
    }
}

#[derive(Serialize, Deserialize)]
struct ReadingDoc {
    timestamp: f64,
    #[serde(default = "missing_channel", deserialize_with = "nullable_channel")]
    accel_x: f64,
    #[serde(default = "missing_channel", deserialize_with = "nullable_channel")]
    accel_y: f64,
    #[serde(default = "missing_channel", deserialize_with = "nullable_channel")]
    accel_z: f64,
    #[serde(default = "missing_channel", deserialize_with = "nullable_channel")]
    gyro_x: f64,
    #[serde(default = "missing_channel", deserialize_with = "nullable_channel")]
    gyro_y: f64,
    #[serde(default = "missing_channel", deserialize_with = "nullable_channel")]
    gyro_z: f64,
    #[serde(default = "missing_channel", deserialize_with = "nullable_channel")]
    lidar_range: f64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_label",
        deserialize_with = "deserialize_label"
    )]
    is_anomaly: Option<bool>,
}

impl From<ReadingDoc> for Reading {
    fn from(doc: ReadingDoc) -> Self {
        Reading {
            timestamp: doc.timestamp,
            values: [
                doc.accel_x,
                doc.accel_y,
                doc.accel_z,
                doc.gyro_x,
                doc.gyro_y,
                doc.gyro_z,
                doc.lidar_range,
            ],
            is_anomaly: doc.is_anomaly,
        }
    }
}

impl From<Reading> for ReadingDoc {
    fn from(r: Reading) -> Self {
        let [accel_x, accel_y, accel_z, gyro_x, gyro_y, gyro_z, lidar_range] = r.values;
        ReadingDoc {
            timestamp: r.timestamp,
            accel_x,
            accel_y,
            accel_z,
            gyro_x,
            gyro_y,
            gyro_z,
            lidar_range,
            is_anomaly: r.is_anomaly,
        }
    }
}

fn missing_channel() -> f64 {
    f64::NAN
}

fn nullable_channel<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Label {
    Flag(bool),
    Number(f64),
}

fn deserialize_label<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Label>::deserialize(deserializer)?.map(|label| match label {
        Label::Flag(b) => b,
        Label::Number(n) => n != 0.0,
    }))
}

// Labels are written back as 0/1, matching the stored sensor documents.
fn serialize_label<S>(label: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match label {
        Some(b) => serializer.serialize_u8(u8::from(*b)),
        None => serializer.serialize_none(),
    }
}
