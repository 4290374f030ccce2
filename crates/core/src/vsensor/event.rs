//! Event vocabulary exchanged between producers and listeners
//!
//! Producer-facing events ([`VSensorEvent`]) are dispatched to a VSensor's
//! `update` entry point. Listener-facing events ([`ListenerEvent`]) are
//! delivered to listener handlers through `notify`. The two sets share numeric
//! codes on the host protocol, so they are kept as distinct types here.

use super::data::{SensorConfig, SensorData};

/// Numeric event codes used when events cross the host protocol
pub mod code {
    pub const SETUP: u8 = 0;
    pub const NEW_DATA: u8 = 1;
    pub const SUBSCRIBE: u8 = 2;
    pub const UNSUBSCRIBE: u8 = 3;
    pub const NEW_REQUESTED_RI: u8 = 4;
    pub const NEW_REQUESTED_MRL: u8 = 5;
    pub const SET_CONFIG: u8 = 6;
    pub const GET_CONFIG: u8 = 7;
    pub const GET_DATA: u8 = 8;
    pub const FLUSH_DATA: u8 = 9;

    pub const HAS_SUBSCRIBED: u8 = SUBSCRIBE;
    pub const HAS_UNSUBSCRIBED: u8 = UNSUBSCRIBE;
    pub const NEW_EFFECTIVE_RI: u8 = NEW_REQUESTED_RI;
    pub const NEW_EFFECTIVE_MRL: u8 = NEW_REQUESTED_MRL;
    pub const NEW_CONFIG: u8 = GET_CONFIG;
    pub const FLUSH_COMPLETE: u8 = FLUSH_DATA;

    /// First code of the application-defined range
    pub const CUSTOM_MIN: u8 = 32;
    /// Upper bound (exclusive) for any event code
    pub const MAX: u8 = 64;
}

/// Application-defined event with a code in `[32, 64)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CustomEvent {
    code: u8,
    /// Opaque argument
    pub value: u32,
}

impl CustomEvent {
    /// Returns `None` when `code` is outside the custom range
    pub const fn new(code: u8, value: u32) -> Option<Self> {
        if code >= code::CUSTOM_MIN && code < code::MAX {
            Some(Self { code, value })
        } else {
            None
        }
    }

    pub const fn code(&self) -> u8 {
        self.code
    }
}

/// Event handled by a VSensor producer
#[derive(Debug)]
pub enum VSensorEvent<'a> {
    /// First attach: reset state, attach to upstream VSensors, claim hardware
    Setup,
    /// First listener enabled: start acquisition
    Subscribe,
    /// Last listener disabled: stop acquisition
    Unsubscribe,
    /// Aggregate requested report interval changed (µs)
    NewRequestedRi(u32),
    /// Aggregate requested max report latency changed (µs)
    NewRequestedMrl(u32),
    /// Apply a configuration setting
    SetConfig(&'a SensorConfig),
    /// Fill in the value of the selected configuration setting
    GetConfig(&'a mut SensorConfig),
    /// Return the last known sample
    GetData(&'a mut Option<SensorData>),
    /// Emit buffered samples, then `FLUSH_COMPLETE`
    FlushData,
    /// Application-defined event
    Custom(CustomEvent),
}

impl VSensorEvent<'_> {
    /// Host protocol code of this event
    pub fn code(&self) -> u8 {
        match self {
            VSensorEvent::Setup => code::SETUP,
            VSensorEvent::Subscribe => code::SUBSCRIBE,
            VSensorEvent::Unsubscribe => code::UNSUBSCRIBE,
            VSensorEvent::NewRequestedRi(_) => code::NEW_REQUESTED_RI,
            VSensorEvent::NewRequestedMrl(_) => code::NEW_REQUESTED_MRL,
            VSensorEvent::SetConfig(_) => code::SET_CONFIG,
            VSensorEvent::GetConfig(_) => code::GET_CONFIG,
            VSensorEvent::GetData(_) => code::GET_DATA,
            VSensorEvent::FlushData => code::FLUSH_DATA,
            VSensorEvent::Custom(custom) => custom.code(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VSensorEvent::Setup => "SETUP",
            VSensorEvent::Subscribe => "SUBSCRIBE",
            VSensorEvent::Unsubscribe => "UNSUBSCRIBE",
            VSensorEvent::NewRequestedRi(_) => "NEW_REQUESTED_RI",
            VSensorEvent::NewRequestedMrl(_) => "NEW_REQUESTED_MRL",
            VSensorEvent::SetConfig(_) => "SET_CONFIG",
            VSensorEvent::GetConfig(_) => "GET_CONFIG",
            VSensorEvent::GetData(_) => "GET_DATA",
            VSensorEvent::FlushData => "FLUSH_DATA",
            VSensorEvent::Custom(_) => "CUSTOM",
        }
    }
}

/// Event delivered to a listener handler
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ListenerEvent {
    /// New sample from the VSensor
    NewData(SensorData),
    /// Listener was inserted in the subscriber set (sent before any rate event)
    HasSubscribed,
    /// Listener was removed from the subscriber set
    HasUnsubscribed,
    /// Effective report interval applied by the VSensor (µs)
    NewEffectiveRi(u32),
    /// Effective max report latency applied by the VSensor (µs)
    NewEffectiveMrl(u32),
    /// VSensor configuration changed
    NewConfig(SensorConfig),
    /// All buffered samples were delivered
    FlushComplete,
    /// Application-defined event
    Custom(CustomEvent),
}

impl ListenerEvent {
    /// Host protocol code of this event
    pub fn code(&self) -> u8 {
        match self {
            ListenerEvent::NewData(_) => code::NEW_DATA,
            ListenerEvent::HasSubscribed => code::HAS_SUBSCRIBED,
            ListenerEvent::HasUnsubscribed => code::HAS_UNSUBSCRIBED,
            ListenerEvent::NewEffectiveRi(_) => code::NEW_EFFECTIVE_RI,
            ListenerEvent::NewEffectiveMrl(_) => code::NEW_EFFECTIVE_MRL,
            ListenerEvent::NewConfig(_) => code::NEW_CONFIG,
            ListenerEvent::FlushComplete => code::FLUSH_COMPLETE,
            ListenerEvent::Custom(custom) => custom.code(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerEvent::NewData(_) => "NEW_DATA",
            ListenerEvent::HasSubscribed => "HAS_SUBSCRIBED",
            ListenerEvent::HasUnsubscribed => "HAS_UNSUBSCRIBED",
            ListenerEvent::NewEffectiveRi(_) => "NEW_EFFECTIVE_RI",
            ListenerEvent::NewEffectiveMrl(_) => "NEW_EFFECTIVE_MRL",
            ListenerEvent::NewConfig(_) => "NEW_CONFIG",
            ListenerEvent::FlushComplete => "FLUSH_COMPLETE",
            ListenerEvent::Custom(_) => "CUSTOM",
        }
    }
}
