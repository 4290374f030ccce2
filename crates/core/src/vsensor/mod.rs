//! Virtual sensors
//!
//! A VSensor is a named data source with a type tag and a behavior (its
//! producer). Listeners subscribe to a VSensor, each with its own requested
//! report interval (RI) and max report latency (MRL); the engine arbitrates
//! those requests into one effective RI/MRL that drives the producer.
//!
//! VSensors are freely composable: a producer may itself attach listeners to
//! other VSensors (sensor fusion), forming a dependency graph walked lazily
//! through setup and subscribe.
//!
//! # Modules
//!
//! - [`hub`]: VSensor and listener arena, lifecycle and notification
//! - [`arbitration`]: RI/MRL aggregation
//! - [`smart`]: decimating listeners
//! - [`event`]: producer and listener event vocabulary
//! - [`data`]: sample payloads and configuration settings
//! - [`types`]: sensor type catalog
//! - [`error`]: error type

pub mod arbitration;
pub mod data;
pub mod error;
pub mod event;
pub mod hub;
pub mod mock;
pub mod smart;
pub mod types;

pub use arbitration::ApplyFlags;
pub use data::{PowerMode, SensorConfig, SensorData};
pub use error::{Result, VSensorError};
pub use event::{CustomEvent, ListenerEvent, VSensorEvent};
pub use hub::{
    handler_fn, HubConfig, ListenerHandler, ListenerId, SetupStatus, VSensorAttr, VSensorHub,
    VSensorId, VSensorProducer, DEFAULT_MIN_RI_US, MAX_SUBSCRIBERS,
};
pub use smart::{Decimation, Decimator, RirDecimator, SmartHandler, MAX_DECIMATOR_ITERATIONS};
pub use types::SensorType;
