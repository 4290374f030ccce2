//! Derived VSensors
//!
//! Subsystems consume other VSensors through listeners and publish their
//! results as VSensors of their own.
//!
//! ## Modules
//!
//! - `gravity`: low-pass gravity estimate from the accelerometer

pub mod gravity;

pub use gravity::GravitySensor;
