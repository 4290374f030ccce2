//! imu_sdk_core - Virtual sensor engine for the motion SDK
//!
//! This crate contains the platform-agnostic publish/subscribe core that sits
//! between IMU device drivers (or sensor fusion algorithms) and the
//! applications consuming their data. It can be tested on host without any
//! feature flags.
//!
//! # Modules
//!
//! - [`vsensor`]: VSensor producers, listeners, rate arbitration and decimation
//! - [`traits`]: Platform-agnostic trait abstractions (TimeSource)
//! - [`logging`]: Logging macros (defmt on target, stdout in host tests)

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
pub mod logging;

pub mod traits;
pub mod vsensor;
