//! Mock producer and listener for testing
//!
//! [`MockProducer`] records every event it receives and can be configured to
//! fail setup, override the effective RI, or serve a canned sample.
//! [`EventLog`] is a listener handler recording every delivered event.
//!
//! # Feature Gate
//!
//! Available during test builds and when the `mock` feature is enabled.

#![cfg(any(test, feature = "mock"))]

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use super::data::{SensorConfig, SensorData};
use super::error::{Result, VSensorError};
use super::event::{ListenerEvent, VSensorEvent};
use super::hub::{ListenerHandler, ListenerId, VSensorHub, VSensorId, VSensorProducer};

/// One producer-side event as seen by [`MockProducer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerCall {
    Setup,
    Subscribe,
    Unsubscribe,
    RequestedRi(u32),
    RequestedMrl(u32),
    SetConfig,
    GetConfig,
    GetData,
    FlushData,
    Custom(u8),
}

/// Recording producer
pub struct MockProducer {
    calls: RefCell<Vec<ProducerCall>>,
    setup_error: Cell<Option<VSensorError>>,
    ri_override: Cell<Option<u32>>,
    sample: Cell<Option<SensorData>>,
    config: Cell<Option<SensorConfig>>,
}

impl Default for MockProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProducer {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            setup_error: Cell::new(None),
            ri_override: Cell::new(None),
            sample: Cell::new(None),
            config: Cell::new(None),
        }
    }

    /// Producer whose setup fails with `error`
    pub fn failing_setup(error: VSensorError) -> Self {
        let producer = Self::new();
        producer.setup_error.set(Some(error));
        producer
    }

    /// Snap every requested RI to `ri`
    pub fn set_ri_override(&self, ri: Option<u32>) {
        self.ri_override.set(ri);
    }

    /// Sample served by `GET_DATA` and emitted by `FLUSH_DATA`
    pub fn set_sample(&self, sample: Option<SensorData>) {
        self.sample.set(sample);
    }

    pub fn calls(&self) -> Vec<ProducerCall> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, call: ProducerCall) -> usize {
        self.calls.borrow().iter().filter(|c| **c == call).count()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, call: ProducerCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl VSensorProducer for MockProducer {
    fn update(&self, hub: &mut VSensorHub, id: VSensorId, event: VSensorEvent<'_>) -> Result<()> {
        match event {
            VSensorEvent::Setup => {
                self.record(ProducerCall::Setup);
                match self.setup_error.get() {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            }
            VSensorEvent::Subscribe => {
                self.record(ProducerCall::Subscribe);
                Ok(())
            }
            VSensorEvent::Unsubscribe => {
                self.record(ProducerCall::Unsubscribe);
                Ok(())
            }
            VSensorEvent::NewRequestedRi(ri) => {
                self.record(ProducerCall::RequestedRi(ri));
                if let Some(applied) = self.ri_override.get() {
                    hub.set_effective_ri(id, applied);
                }
                Ok(())
            }
            VSensorEvent::NewRequestedMrl(mrl) => {
                self.record(ProducerCall::RequestedMrl(mrl));
                Ok(())
            }
            VSensorEvent::SetConfig(config) => {
                self.record(ProducerCall::SetConfig);
                self.config.set(Some(*config));
                hub.notify_config(id, *config);
                Ok(())
            }
            VSensorEvent::GetConfig(config) => {
                self.record(ProducerCall::GetConfig);
                match self.config.get() {
                    Some(stored) if stored.same_setting(config) => {
                        *config = stored;
                        Ok(())
                    }
                    _ => Err(VSensorError::NoData),
                }
            }
            VSensorEvent::GetData(out) => {
                self.record(ProducerCall::GetData);
                *out = self.sample.get();
                Ok(())
            }
            VSensorEvent::FlushData => {
                self.record(ProducerCall::FlushData);
                if let Some(sample) = self.sample.get() {
                    hub.notify_data(id, sample);
                }
                hub.notify_flush_complete(id);
                Ok(())
            }
            VSensorEvent::Custom(custom) => {
                self.record(ProducerCall::Custom(custom.code()));
                Err(VSensorError::Unsupported)
            }
        }
    }
}

/// Recording listener handler
#[derive(Default)]
pub struct EventLog {
    events: RefCell<Vec<(ListenerId, ListenerEvent)>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle usable with `attach`
    pub fn handler(self: &Rc<Self>) -> Rc<dyn ListenerHandler> {
        let handler: Rc<dyn ListenerHandler> = self.clone();
        handler
    }

    /// Every recorded event, in delivery order
    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.borrow().iter().map(|(_, e)| *e).collect()
    }

    /// Events delivered to one listener
    pub fn events_for(&self, listener: ListenerId) -> Vec<ListenerEvent> {
        self.events
            .borrow()
            .iter()
            .filter(|(l, _)| *l == listener)
            .map(|(_, e)| *e)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// Number of `NEW_DATA` events
    pub fn data_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|(_, e)| matches!(e, ListenerEvent::NewData(_)))
            .count()
    }

    /// Values of every `NEW_EFFECTIVE_RI` delivered to `listener`
    pub fn effective_ri_for(&self, listener: ListenerId) -> Vec<u32> {
        self.events
            .borrow()
            .iter()
            .filter(|(l, _)| *l == listener)
            .filter_map(|(_, e)| match e {
                ListenerEvent::NewEffectiveRi(ri) => Some(*ri),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl ListenerHandler for EventLog {
    fn handle(&self, _hub: &mut VSensorHub, listener: ListenerId, event: &ListenerEvent) {
        self.events.borrow_mut().push((listener, *event));
    }
}
