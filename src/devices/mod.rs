//! Device drivers
//!
//! ## Modules
//!
//! - `imu`: IMU devices (mock) and the adapter publishing them as VSensors
//! - `traits`: Device trait definitions (ImuSource, etc.)

pub mod imu;
pub mod traits;
