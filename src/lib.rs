#![cfg_attr(not(test), no_std)]

//! imu_sdk - Virtual sensor SDK for IMU devices
//!
//! Exposes IMU devices and sensor fusion algorithms as VSensors on top of the
//! [`imu_sdk_core`] publish/subscribe engine.
//!
//! # Modules
//!
//! - [`devices`]: IMU source trait, mock device and its VSensor adapter
//! - [`subsystems`]: derived VSensors built from other VSensors (gravity)

extern crate alloc;

#[macro_use]
extern crate imu_sdk_core;

pub use imu_sdk_core::{traits, vsensor};

pub mod devices;
pub mod subsystems;
