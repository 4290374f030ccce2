//! Data and configuration payloads carried by VSensor events
//!
//! All values are in SI units, body frame:
//! - Acceleration / gravity: m/s²
//! - Angular rate: rad/s
//! - Magnetic field: µT
//! - Temperature: °C

use nalgebra::{Matrix3, Quaternion, Vector3};

/// One data unit published with `NEW_DATA`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorData {
    /// Calibrated 3-axis sample
    Vector {
        timestamp_us: u64,
        value: Vector3<f32>,
        /// Calibration accuracy (0 = unreliable .. 3 = high)
        accuracy: u8,
    },
    /// Uncalibrated 3-axis sample with the bias estimate alongside
    UncalVector {
        timestamp_us: u64,
        value: Vector3<f32>,
        bias: Vector3<f32>,
    },
    /// Orientation quaternion (scalar-first)
    Quaternion {
        timestamp_us: u64,
        value: Quaternion<f32>,
        /// Heading accuracy estimate in radians
        accuracy_rad: f32,
    },
    /// Single scalar value (temperature, pressure, ...)
    Scalar { timestamp_us: u64, value: f32 },
    /// Monotonic counter (step counter)
    Counter { timestamp_us: u64, count: u64 },
    /// Gesture / detector event without payload
    Event { timestamp_us: u64 },
    /// Raw ADC counts
    Raw { timestamp_us: u64, value: [i32; 3] },
}

impl SensorData {
    /// Sample timestamp in microseconds since boot
    pub fn timestamp_us(&self) -> u64 {
        match *self {
            SensorData::Vector { timestamp_us, .. }
            | SensorData::UncalVector { timestamp_us, .. }
            | SensorData::Quaternion { timestamp_us, .. }
            | SensorData::Scalar { timestamp_us, .. }
            | SensorData::Counter { timestamp_us, .. }
            | SensorData::Event { timestamp_us }
            | SensorData::Raw { timestamp_us, .. } => timestamp_us,
        }
    }

    /// 3-axis value for vector-shaped samples
    pub fn vector(&self) -> Option<Vector3<f32>> {
        match *self {
            SensorData::Vector { value, .. } | SensorData::UncalVector { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Device power mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerMode {
    LowNoise,
    LowPower,
}

/// Configuration payload for `SET_CONFIG` / `GET_CONFIG` / `NEW_CONFIG`
///
/// For `GET_CONFIG` the caller selects the setting by passing the variant it
/// wants; the producer overwrites the value in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorConfig {
    /// Mounting matrix applied to 3-axis outputs
    ReferenceFrame(Matrix3<f32>),
    /// Full-scale range (mg, dps or µT depending on the sensor)
    FullScaleRange(u32),
    /// Offset subtracted from 3-axis outputs
    Offset(Vector3<f32>),
    /// Per-axis gain matrix
    Gain(Matrix3<f32>),
    /// Low-pass filter bandwidth in Hz
    Bandwidth(u32),
    /// Device power mode
    PowerMode(PowerMode),
    /// Application-defined setting
    Custom { id: u8, value: u32 },
}

impl SensorConfig {
    /// True when `other` selects the same setting (ignores the value)
    pub fn same_setting(&self, other: &SensorConfig) -> bool {
        match (self, other) {
            (SensorConfig::Custom { id: a, .. }, SensorConfig::Custom { id: b, .. }) => a == b,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}
