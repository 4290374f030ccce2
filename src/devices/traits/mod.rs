//! Device traits
//!
//! Hardware-independent trait definitions for device drivers. The VSensor
//! adapters only talk to devices through these traits, so a mock can stand in
//! for the hardware in tests.

pub mod imu;

pub use imu::{ImuError, ImuReading, ImuSource};
