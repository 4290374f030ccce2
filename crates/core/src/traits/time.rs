//! Monotonic time source used to pace polled producers.
//!
//! Report intervals are expressed in microseconds throughout the SDK, so the
//! trait only exposes a microsecond clock.

use core::cell::Cell;

/// Platform-agnostic monotonic clock.
///
/// # Example
///
/// ```
/// use imu_sdk_core::traits::{MockTime, TimeSource};
///
/// fn is_due<T: TimeSource>(time: &T, last_us: u64, ri_us: u32) -> bool {
///     time.elapsed_since(last_us) >= u64::from(ri_us)
/// }
///
/// let time = MockTime::new();
/// time.advance(20_000);
/// assert!(is_due(&time, 0, 20_000));
/// ```
pub trait TimeSource {
    /// Returns current time in microseconds since system start.
    fn now_us(&self) -> u64;

    /// Returns elapsed microseconds since `reference_us`, saturating at zero.
    fn elapsed_since(&self, reference_us: u64) -> u64 {
        self.now_us().saturating_sub(reference_us)
    }
}

/// Controllable clock for host tests.
#[derive(Clone, Default)]
pub struct MockTime {
    current_us: Cell<u64>,
}

impl MockTime {
    /// Creates a new `MockTime` starting at time 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current time to an absolute value.
    pub fn set(&self, us: u64) {
        self.current_us.set(us);
    }

    /// Advances the current time by `us` microseconds.
    pub fn advance(&self, us: u64) {
        self.current_us.set(self.current_us.get().saturating_add(us));
    }
}

impl TimeSource for MockTime {
    fn now_us(&self) -> u64 {
        self.current_us.get()
    }
}
