//! VSensor error types

use core::fmt;

/// Result type for VSensor operations
pub type Result<T> = core::result::Result<T, VSensorError>;

/// Errors reported by the VSensor engine and by producers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VSensorError {
    /// Stale or unknown VSensor/listener handle
    InvalidHandle,
    /// VSensor kind is `Unknown` (never initialized)
    Uninitialized,
    /// Producer setup failed; sticky until the VSensor is re-initialized
    SetupFailed,
    /// Producer does not handle this event
    Unsupported,
    /// Producer-reported failure code
    Producer(i16),
    /// No data available yet
    NoData,
    /// Hub arena is full
    HubFull,
    /// Listener must be disabled first
    ListenerActive,
    /// VSensor still has active listeners
    Busy,
    /// Configuration payload rejected by the producer
    InvalidConfig,
}

impl VSensorError {
    /// Return variant name as a static string (usable with defmt on embedded)
    pub fn as_str(&self) -> &'static str {
        match self {
            VSensorError::InvalidHandle => "InvalidHandle",
            VSensorError::Uninitialized => "Uninitialized",
            VSensorError::SetupFailed => "SetupFailed",
            VSensorError::Unsupported => "Unsupported",
            VSensorError::Producer(_) => "Producer",
            VSensorError::NoData => "NoData",
            VSensorError::HubFull => "HubFull",
            VSensorError::ListenerActive => "ListenerActive",
            VSensorError::Busy => "Busy",
            VSensorError::InvalidConfig => "InvalidConfig",
        }
    }
}

impl fmt::Display for VSensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VSensorError::InvalidHandle => write!(f, "invalid vsensor or listener handle"),
            VSensorError::Uninitialized => write!(f, "vsensor not initialized"),
            VSensorError::SetupFailed => write!(f, "vsensor setup failed"),
            VSensorError::Unsupported => write!(f, "event not supported by vsensor"),
            VSensorError::Producer(code) => write!(f, "vsensor producer error ({})", code),
            VSensorError::NoData => write!(f, "no data available"),
            VSensorError::HubFull => write!(f, "vsensor hub full"),
            VSensorError::ListenerActive => write!(f, "listener is still enabled"),
            VSensorError::Busy => write!(f, "vsensor has active listeners"),
            VSensorError::InvalidConfig => write!(f, "invalid vsensor configuration"),
        }
    }
}
