//! Core traits for platform-agnostic sensor scheduling.
//!
//! Trait definitions are pure and have no feature gates. Mock implementations
//! are always available for host testing; board implementations live with the
//! board support code.

pub mod time;

pub use time::{MockTime, TimeSource};
