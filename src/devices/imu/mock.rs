//! Mock IMU implementation for testing
//!
//! Provides a configurable mock IMU that implements the `ImuSource` trait.
//! Useful for testing the VSensor adapter and fusion subsystems without
//! hardware.
//!
//! ## Usage
//!
//! ```ignore
//! use imu_sdk::devices::imu::MockImu;
//! use imu_sdk::devices::traits::ImuSource;
//!
//! let mut imu = MockImu::with_default_reading();
//! imu.set_enabled(true)?;
//! let reading = imu.read_all()?;
//! ```

use crate::devices::traits::{ImuError, ImuReading, ImuSource};

/// Default output data period (400 Hz)
pub const DEFAULT_PERIOD_US: u32 = 2500;

/// Mock IMU for testing
///
/// Returns queued readings in sequence, then the default reading. Each read
/// advances the device timestamp by the programmed sample period.
pub struct MockImu {
    /// Queue of readings to return
    readings: heapless::Deque<ImuReading, 64>,

    /// Default reading when queue is empty
    default_reading: ImuReading,

    /// Health status (can be set for testing error handling)
    healthy: bool,

    /// Consecutive read error count
    error_count: u32,

    /// Timestamp counter (microseconds)
    timestamp_us: u64,

    /// Programmed output data period
    sample_period_us: u32,

    /// Sensing path powered
    enabled: bool,

    /// Successful reads since creation
    read_count: u32,

    /// Every period programmed, in order
    period_history: heapless::Vec<u32, 16>,
}

impl Default for MockImu {
    fn default() -> Self {
        Self::with_default_reading()
    }
}

impl MockImu {
    /// Create a new mock IMU with default reading
    pub fn with_default_reading() -> Self {
        Self {
            readings: heapless::Deque::new(),
            default_reading: ImuReading::default(),
            healthy: true,
            error_count: 0,
            timestamp_us: 0,
            sample_period_us: DEFAULT_PERIOD_US,
            enabled: false,
            read_count: 0,
            period_history: heapless::Vec::new(),
        }
    }

    /// Create a mock IMU with a sequence of readings
    pub fn with_readings(readings: &[ImuReading]) -> Self {
        let mut imu = Self::with_default_reading();
        for reading in readings.iter().take(64) {
            let _ = imu.readings.push_back(*reading);
        }
        imu
    }

    /// Set the default reading to return when queue is empty
    pub fn set_default_reading(&mut self, reading: ImuReading) {
        self.default_reading = reading;
    }

    /// Push a new reading onto the queue
    pub fn push_reading(&mut self, reading: ImuReading) -> Result<(), ImuReading> {
        self.readings.push_back(reading)
    }

    /// Set health status (for testing error handling)
    pub fn set_healthy(&mut self, healthy: bool) {
        self.healthy = healthy;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn sample_period_us(&self) -> u32 {
        self.sample_period_us
    }

    pub fn read_count(&self) -> u32 {
        self.read_count
    }

    /// Periods programmed through `set_sample_period_us`
    pub fn period_history(&self) -> &[u32] {
        &self.period_history
    }

    fn next_reading(&mut self) -> ImuReading {
        self.timestamp_us += u64::from(self.sample_period_us);

        let mut reading = self.readings.pop_front().unwrap_or(self.default_reading);
        reading.timestamp_us = self.timestamp_us;
        reading
    }
}

impl ImuSource for MockImu {
    fn read_all(&mut self) -> Result<ImuReading, ImuError> {
        if !self.healthy {
            self.error_count += 1;
            return Err(ImuError::BusError);
        }
        if !self.enabled {
            return Err(ImuError::NotInitialized);
        }

        self.error_count = 0;
        self.read_count += 1;
        Ok(self.next_reading())
    }

    fn set_sample_period_us(&mut self, period_us: u32) -> Result<(), ImuError> {
        if period_us == 0 {
            return Err(ImuError::UnsupportedRate);
        }
        self.sample_period_us = period_us;
        if self.period_history.is_full() {
            self.period_history.remove(0);
        }
        let _ = self.period_history.push(period_us);
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), ImuError> {
        if enabled && !self.healthy {
            return Err(ImuError::BusError);
        }
        self.enabled = enabled;
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.healthy && self.error_count < 3
    }
}
