//! IMU Devices
//!
//! ## Available Modules
//!
//! - `mock`: Mock IMU for testing (always available)
//! - `vsensor`: adapter publishing an `ImuSource` as accelerometer, gyroscope,
//!   magnetometer and temperature VSensors
//!
//! ## Usage
//!
//! ```ignore
//! use imu_sdk::devices::imu::{ImuChannel, ImuVSensors, MockImu};
//!
//! let sensors = ImuVSensors::register(&mut hub, MockImu::default(), VSensorAttr::default())?;
//! let accel = hub.attach(sensors.id(ImuChannel::Accel), Some(handler), 0)?;
//! hub.enable(accel);
//! loop {
//!     sensors.poll(&mut hub, &time)?;
//! }
//! ```

pub mod mock;
pub mod vsensor;

pub use mock::MockImu;
pub use vsensor::{snap_period, ImuChannel, ImuVSensors, SUPPORTED_PERIODS_US};
