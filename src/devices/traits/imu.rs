//! IMU Source Trait and Data Types
//!
//! Device-independent interface for IMU devices published as VSensors.
//!
//! ## Usage
//!
//! ```ignore
//! use imu_sdk::devices::traits::{ImuSource, ImuReading};
//!
//! fn sample<I: ImuSource>(imu: &mut I) -> Result<ImuReading, ImuError> {
//!     imu.set_enabled(true)?;
//!     imu.set_sample_period_us(2500)?;
//!     imu.read_all()
//! }
//! ```

use core::fmt;

use imu_sdk_core::vsensor::VSensorError;
use nalgebra::Vector3;

/// IMU error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImuError {
    /// Bus communication failed
    BusError,

    /// Data validation failed (e.g., stuck sensor)
    InvalidData,

    /// Device powered down or not initialized
    NotInitialized,

    /// Sensor self-test failed
    SelfTestFailed,

    /// Requested sample period not supported
    UnsupportedRate,
}

impl ImuError {
    /// Producer failure code carried by [`VSensorError::Producer`]
    pub fn code(&self) -> i16 {
        match self {
            ImuError::BusError => -1,
            ImuError::InvalidData => -2,
            ImuError::NotInitialized => -3,
            ImuError::SelfTestFailed => -4,
            ImuError::UnsupportedRate => -5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImuError::BusError => "BusError",
            ImuError::InvalidData => "InvalidData",
            ImuError::NotInitialized => "NotInitialized",
            ImuError::SelfTestFailed => "SelfTestFailed",
            ImuError::UnsupportedRate => "UnsupportedRate",
        }
    }
}

impl fmt::Display for ImuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImuError::BusError => write!(f, "bus communication failed"),
            ImuError::InvalidData => write!(f, "invalid sensor data"),
            ImuError::NotInitialized => write!(f, "device not initialized"),
            ImuError::SelfTestFailed => write!(f, "self-test failed"),
            ImuError::UnsupportedRate => write!(f, "unsupported sample period"),
        }
    }
}

impl From<ImuError> for VSensorError {
    fn from(e: ImuError) -> Self {
        VSensorError::Producer(e.code())
    }
}

/// One reading of every IMU channel
///
/// All values are in SI units, body frame:
/// - X: Right
/// - Y: Forward
/// - Z: Up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuReading {
    /// Gyroscope: rad/s
    pub gyro: Vector3<f32>,

    /// Accelerometer: m/s² (includes gravity)
    pub accel: Vector3<f32>,

    /// Magnetometer: µT
    pub mag: Vector3<f32>,

    /// Temperature: °C
    pub temperature: f32,

    /// Timestamp: microseconds since boot
    pub timestamp_us: u64,
}

impl Default for ImuReading {
    fn default() -> Self {
        Self {
            gyro: Vector3::zeros(),
            accel: Vector3::new(0.0, 0.0, 9.80665), // at rest, 1g
            mag: Vector3::zeros(),
            temperature: 25.0,
            timestamp_us: 0,
        }
    }
}

/// Device-independent IMU interface
///
/// The device is sampled synchronously from the polling loop; the VSensor
/// adapter decides when to power it and at which period.
pub trait ImuSource {
    /// Read all channels of the latest sample
    fn read_all(&mut self) -> Result<ImuReading, ImuError>;

    /// Program the output data period (µs)
    fn set_sample_period_us(&mut self, period_us: u32) -> Result<(), ImuError>;

    /// Power the sensing path up or down
    fn set_enabled(&mut self, enabled: bool) -> Result<(), ImuError>;

    /// Get sensor health status
    ///
    /// Returns false if sensor has consecutive read errors or failed its
    /// self-test.
    fn is_healthy(&self) -> bool;
}
