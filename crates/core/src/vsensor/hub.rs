//! VSensor hub
//!
//! The hub owns every VSensor and every listener of the system in two arenas.
//! Both sides refer to each other through generation-checked handles
//! ([`VSensorId`], [`ListenerId`]) instead of references, so a stale handle is
//! detected instead of dangling.
//!
//! All operations run synchronously on the caller's execution context. Producer
//! and handler callbacks receive `&mut VSensorHub` and may call back into the
//! hub (enable listeners on other VSensors, notify their own subscribers, ...).
//! Callbacks are stored behind `Rc` and cloned out of the arena before being
//! invoked, which keeps such re-entrant calls legal.

use alloc::rc::Rc;
use alloc::vec::Vec;

use super::arbitration::ApplyFlags;
use super::data::{SensorConfig, SensorData};
use super::error::{Result, VSensorError};
use super::event::{CustomEvent, ListenerEvent, VSensorEvent};
use super::types::SensorType;

/// Default floor for the effective report interval (1 ms)
pub const DEFAULT_MIN_RI_US: u32 = 1000;

/// Maximum number of simultaneously enabled listeners per VSensor
pub const MAX_SUBSCRIBERS: usize = 16;

/// Handle to a VSensor owned by a [`VSensorHub`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VSensorId {
    index: u16,
    generation: u16,
}

impl VSensorId {
    /// Arena slot of this VSensor
    pub fn index(&self) -> u16 {
        self.index
    }
}

/// Handle to a listener owned by a [`VSensorHub`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ListenerId {
    index: u16,
    generation: u16,
}

impl ListenerId {
    /// Arena slot of this listener
    pub fn index(&self) -> u16 {
        self.index
    }
}

/// Static attributes of a VSensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VSensorAttr {
    /// Effective RI is never pushed below this value (µs)
    pub min_ri: u32,
}

impl VSensorAttr {
    /// Upper RI bound of the reference SDK. Not applied: arbitration only
    /// clamps to the floor.
    pub const DEFAULT_MAX_RI_US: u32 = 1_000_000;

    pub const fn new(min_ri: u32) -> Self {
        Self { min_ri }
    }
}

impl Default for VSensorAttr {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_RI_US)
    }
}

/// Hub sizing and defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Maximum number of registered VSensors
    pub max_vsensors: usize,
    /// Maximum number of live listeners
    pub max_listeners: usize,
    /// Attributes used when a VSensor is registered without any
    pub default_attr: VSensorAttr,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_vsensors: 32,
            max_listeners: 64,
            default_attr: VSensorAttr::default(),
        }
    }
}

/// Memoized outcome of the producer's `SETUP` event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SetupStatus {
    NotSetup,
    SetupOk,
    /// Sticky until the VSensor is re-initialized
    SetupError,
}

impl SetupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupStatus::NotSetup => "NotSetup",
            SetupStatus::SetupOk => "SetupOk",
            SetupStatus::SetupError => "SetupError",
        }
    }
}

/// Behavior of a data producer (hardware-backed or algorithmic)
///
/// Every producer behavior is expressed through this single entry point.
/// Producers keep their own state behind interior mutability since `update`
/// may be re-entered while it is running (a fusion sensor that enables a
/// listener whose producer in turn subscribes back to it).
pub trait VSensorProducer {
    /// Handle one event; `Err(VSensorError::Unsupported)` for events the
    /// producer does not implement.
    fn update(&self, hub: &mut VSensorHub, vsensor: VSensorId, event: VSensorEvent<'_>)
        -> Result<()>;
}

/// Consumer side of a subscription
pub trait ListenerHandler {
    fn handle(&self, hub: &mut VSensorHub, listener: ListenerId, event: &ListenerEvent);
}

impl<F> ListenerHandler for F
where
    F: Fn(&mut VSensorHub, ListenerId, &ListenerEvent),
{
    fn handle(&self, hub: &mut VSensorHub, listener: ListenerId, event: &ListenerEvent) {
        self(hub, listener, event)
    }
}

/// Wrap a closure as a shareable listener handler
pub fn handler_fn<F>(f: F) -> Rc<dyn ListenerHandler>
where
    F: Fn(&mut VSensorHub, ListenerId, &ListenerEvent) + 'static,
{
    Rc::new(f)
}

/// Installed when a listener is attached without a handler
struct NoopHandler;

impl ListenerHandler for NoopHandler {
    fn handle(&self, _hub: &mut VSensorHub, _listener: ListenerId, _event: &ListenerEvent) {}
}

pub(super) struct VSensorSlot {
    pub(super) generation: u16,
    pub(super) kind: SensorType,
    pub(super) payload_size: u16,
    pub(super) attr: VSensorAttr,
    pub(super) producer: Rc<dyn VSensorProducer>,
    /// Enabled listeners, in enable order
    pub(super) subscribers: heapless::Vec<ListenerId, MAX_SUBSCRIBERS>,
    /// Last listener being removed while the producer handles `UNSUBSCRIBE`.
    /// Still reachable by `notify`, no longer counted by arbitration.
    pub(super) draining: Option<ListenerId>,
    pub(super) effective_ri: u32,
    pub(super) effective_mrl: u32,
    pub(super) status: SetupStatus,
}

impl VSensorSlot {
    fn new(
        generation: u16,
        producer: Rc<dyn VSensorProducer>,
        kind: SensorType,
        payload_size: u16,
        attr: VSensorAttr,
    ) -> Self {
        Self {
            generation,
            kind,
            payload_size,
            attr,
            producer,
            subscribers: heapless::Vec::new(),
            draining: None,
            effective_ri: 0,
            effective_mrl: 0,
            status: SetupStatus::NotSetup,
        }
    }

    fn is_reachable(&self, listener: ListenerId) -> bool {
        self.subscribers.contains(&listener) || self.draining == Some(listener)
    }
}

pub(super) struct ListenerEntry {
    pub(super) vsensor: VSensorId,
    pub(super) handler: Rc<dyn ListenerHandler>,
    pub(super) requested_ri: u32,
    pub(super) requested_mrl: u32,
    pub(super) arg: usize,
}

struct ListenerSlot {
    generation: u16,
    entry: Option<ListenerEntry>,
}

/// Arena of VSensors and listeners
pub struct VSensorHub {
    config: HubConfig,
    vsensors: Vec<VSensorSlot>,
    listeners: Vec<ListenerSlot>,
    free_listeners: Vec<u16>,
}

impl Default for VSensorHub {
    fn default() -> Self {
        Self::new()
    }
}

impl VSensorHub {
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    pub fn with_config(config: HubConfig) -> Self {
        Self {
            config,
            vsensors: Vec::new(),
            listeners: Vec::new(),
            free_listeners: Vec::new(),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // VSensor registration and attributes
    // ------------------------------------------------------------------

    /// Register a producer as a new VSensor.
    ///
    /// `kind == SensorType::Unknown` is accepted but marks the VSensor as not
    /// initialized: every attach against it fails until it is re-initialized.
    pub fn register_vsensor(
        &mut self,
        producer: Rc<dyn VSensorProducer>,
        kind: SensorType,
        payload_size: u16,
        attr: Option<VSensorAttr>,
    ) -> Result<VSensorId> {
        if self.vsensors.len() >= self.config.max_vsensors
            || self.vsensors.len() >= usize::from(u16::MAX)
        {
            log_warn!("vsensor hub full ({} entries)", self.vsensors.len());
            return Err(VSensorError::HubFull);
        }

        let index = self.vsensors.len() as u16;
        let attr = attr.unwrap_or(self.config.default_attr);
        self.vsensors
            .push(VSensorSlot::new(0, producer, kind, payload_size, attr));

        log_debug!("vsensor {} registered as {}", index, kind.name());
        Ok(VSensorId {
            index,
            generation: 0,
        })
    }

    /// Re-initialize a VSensor in place.
    ///
    /// Clears the memoized setup status (including a sticky setup error) and
    /// the effective rates. The returned handle replaces `id`; listeners bound
    /// to the previous incarnation become invalid.
    pub fn reinit_vsensor(
        &mut self,
        id: VSensorId,
        producer: Rc<dyn VSensorProducer>,
        kind: SensorType,
        payload_size: u16,
        attr: Option<VSensorAttr>,
    ) -> Result<VSensorId> {
        let default_attr = self.config.default_attr;
        let slot = self.slot_mut(id).ok_or(VSensorError::InvalidHandle)?;
        if !slot.subscribers.is_empty() || slot.draining.is_some() {
            return Err(VSensorError::Busy);
        }

        let generation = slot.generation.wrapping_add(1);
        *slot = VSensorSlot::new(
            generation,
            producer,
            kind,
            payload_size,
            attr.unwrap_or(default_attr),
        );

        log_debug!("vsensor {} re-initialized as {}", id.index, kind.name());
        Ok(VSensorId {
            index: id.index,
            generation,
        })
    }

    pub(super) fn slot(&self, id: VSensorId) -> Option<&VSensorSlot> {
        self.vsensors
            .get(usize::from(id.index))
            .filter(|slot| slot.generation == id.generation)
    }

    pub(super) fn slot_mut(&mut self, id: VSensorId) -> Option<&mut VSensorSlot> {
        self.vsensors
            .get_mut(usize::from(id.index))
            .filter(|slot| slot.generation == id.generation)
    }

    pub fn contains_vsensor(&self, id: VSensorId) -> bool {
        self.slot(id).is_some()
    }

    pub fn kind(&self, id: VSensorId) -> Option<SensorType> {
        self.slot(id).map(|slot| slot.kind)
    }

    /// Byte size of one data unit published by the VSensor
    pub fn payload_size(&self, id: VSensorId) -> Option<u16> {
        self.slot(id).map(|slot| slot.payload_size)
    }

    pub fn attr(&self, id: VSensorId) -> Option<VSensorAttr> {
        self.slot(id).map(|slot| slot.attr)
    }

    /// Replace the attributes. Takes effect at the next arbitration pass.
    pub fn set_attr(&mut self, id: VSensorId, attr: VSensorAttr) -> Result<()> {
        let slot = self.slot_mut(id).ok_or(VSensorError::InvalidHandle)?;
        slot.attr = attr;
        Ok(())
    }

    pub fn status(&self, id: VSensorId) -> Option<SetupStatus> {
        self.slot(id).map(|slot| slot.status)
    }

    /// Currently applied report interval (0 when nobody is subscribed)
    pub fn effective_ri(&self, id: VSensorId) -> Option<u32> {
        self.slot(id).map(|slot| slot.effective_ri)
    }

    /// Currently applied max report latency (0 when nobody is subscribed)
    pub fn effective_mrl(&self, id: VSensorId) -> Option<u32> {
        self.slot(id).map(|slot| slot.effective_mrl)
    }

    /// Override the effective RI from inside `NEW_REQUESTED_RI` handling,
    /// e.g. when the hardware only supports discrete rates.
    pub fn set_effective_ri(&mut self, id: VSensorId, ri: u32) {
        match self.slot_mut(id) {
            Some(slot) => slot.effective_ri = ri,
            None => log_warn!("set_effective_ri: stale vsensor {}", id.index),
        }
    }

    /// Override the effective MRL from inside `NEW_REQUESTED_MRL` handling.
    pub fn set_effective_mrl(&mut self, id: VSensorId, mrl: u32) {
        match self.slot_mut(id) {
            Some(slot) => slot.effective_mrl = mrl,
            None => log_warn!("set_effective_mrl: stale vsensor {}", id.index),
        }
    }

    /// Number of enabled listeners
    pub fn subscriber_count(&self, id: VSensorId) -> usize {
        self.slot(id).map_or(0, |slot| slot.subscribers.len())
    }

    // ------------------------------------------------------------------
    // Producer side
    // ------------------------------------------------------------------

    /// Run the producer's `SETUP` event at most once.
    ///
    /// The status is set to `SetupOk` before the producer runs so that a
    /// dependency cycle reaching back to this VSensor terminates; it is
    /// corrected to `SetupError` if the producer fails.
    pub fn setup(&mut self, id: VSensorId) -> Result<()> {
        let slot = self.slot_mut(id).ok_or(VSensorError::InvalidHandle)?;

        if slot.kind == SensorType::Unknown {
            return Err(VSensorError::Uninitialized);
        }

        match slot.status {
            SetupStatus::SetupOk => return Ok(()),
            SetupStatus::SetupError => return Err(VSensorError::SetupFailed),
            SetupStatus::NotSetup => {}
        }

        slot.status = SetupStatus::SetupOk;
        let producer = Rc::clone(&slot.producer);

        match producer.update(self, id, VSensorEvent::Setup) {
            Ok(()) => {
                log_info!("vsensor {} setup ok", id.index);
                Ok(())
            }
            Err(e) => {
                if let Some(slot) = self.slot_mut(id) {
                    slot.status = SetupStatus::SetupError;
                }
                log_error!("vsensor {} setup failed: {}", id.index, e.as_str());
                Err(VSensorError::SetupFailed)
            }
        }
    }

    /// Dispatch one event to the producer's `update` entry point
    pub fn update(&mut self, id: VSensorId, event: VSensorEvent<'_>) -> Result<()> {
        let producer = self
            .slot(id)
            .map(|slot| Rc::clone(&slot.producer))
            .ok_or(VSensorError::InvalidHandle)?;
        producer.update(self, id, event)
    }

    /// Last known sample (`GET_DATA`)
    pub fn get_data(&mut self, id: VSensorId) -> Result<SensorData> {
        let mut out = None;
        self.update(id, VSensorEvent::GetData(&mut out))?;
        out.ok_or(VSensorError::NoData)
    }

    /// Apply a configuration setting (`SET_CONFIG`)
    pub fn set_config(&mut self, id: VSensorId, config: &SensorConfig) -> Result<()> {
        self.update(id, VSensorEvent::SetConfig(config))
    }

    /// Read back the setting selected by `config` (`GET_CONFIG`)
    pub fn get_config(&mut self, id: VSensorId, config: &mut SensorConfig) -> Result<()> {
        self.update(id, VSensorEvent::GetConfig(config))
    }

    /// Ask the producer to deliver everything it buffered (`FLUSH_DATA`)
    pub fn flush(&mut self, id: VSensorId) -> Result<()> {
        self.update(id, VSensorEvent::FlushData)
    }

    /// Dispatch an application-defined event to the producer
    pub fn custom(&mut self, id: VSensorId, event: CustomEvent) -> Result<()> {
        self.update(id, VSensorEvent::Custom(event))
    }

    /// Deliver `event` to every enabled listener of the VSensor, in enable
    /// order. A listener disabled by an earlier handler of the same pass is
    /// skipped.
    pub fn notify(&mut self, id: VSensorId, event: ListenerEvent) {
        let Some(slot) = self.slot(id) else {
            log_warn!("notify: stale vsensor {}", id.index);
            return;
        };

        let targets = slot.subscribers.clone();
        let draining = slot.draining.filter(|l| !targets.contains(l));

        for listener in targets.iter().copied().chain(draining) {
            if self.slot(id).is_some_and(|slot| slot.is_reachable(listener)) {
                self.dispatch(listener, &event);
            }
        }
    }

    pub fn notify_data(&mut self, id: VSensorId, data: SensorData) {
        self.notify(id, ListenerEvent::NewData(data));
    }

    pub fn notify_config(&mut self, id: VSensorId, config: SensorConfig) {
        self.notify(id, ListenerEvent::NewConfig(config));
    }

    pub fn notify_flush_complete(&mut self, id: VSensorId) {
        self.notify(id, ListenerEvent::FlushComplete);
    }

    // ------------------------------------------------------------------
    // Listener side
    // ------------------------------------------------------------------

    /// Create a listener bound to `vsensor` and run the VSensor's setup.
    ///
    /// A missing handler is replaced by a no-op. Requested RI/MRL start at 0.
    /// Fails if the VSensor handle is stale, the VSensor is not initialized,
    /// or its setup fails (now or previously).
    pub fn attach(
        &mut self,
        vsensor: VSensorId,
        handler: Option<Rc<dyn ListenerHandler>>,
        arg: usize,
    ) -> Result<ListenerId> {
        if self.slot(vsensor).is_none() {
            return Err(VSensorError::InvalidHandle);
        }

        let handler = handler.unwrap_or_else(|| Rc::new(NoopHandler));
        let listener = self.alloc_listener(ListenerEntry {
            vsensor,
            handler,
            requested_ri: 0,
            requested_mrl: 0,
            arg,
        })?;

        if let Err(e) = self.setup(vsensor) {
            self.free_listener(listener);
            return Err(e);
        }

        Ok(listener)
    }

    /// Release a disabled listener's slot. Its handle becomes stale.
    pub fn destroy_listener(&mut self, listener: ListenerId) -> Result<()> {
        let entry = self
            .listener_entry(listener)
            .ok_or(VSensorError::InvalidHandle)?;

        if self
            .slot(entry.vsensor)
            .is_some_and(|slot| slot.is_reachable(listener))
        {
            return Err(VSensorError::ListenerActive);
        }

        self.free_listener(listener);
        Ok(())
    }

    /// Subscribe the listener to its VSensor.
    ///
    /// The first listener of a VSensor triggers `SUBSCRIBE` on the producer.
    /// The listener receives `HAS_SUBSCRIBED` before any rate event and is
    /// always told the effective RI and MRL, even when they did not change.
    pub fn enable(&mut self, listener: ListenerId) {
        let Some(vsensor) = self.valid_listener(listener) else {
            log_warn!("enable: invalid listener {}", listener.index);
            return;
        };
        let Some(slot) = self.slot_mut(vsensor) else {
            return;
        };

        if slot.subscribers.contains(&listener) {
            return;
        }

        let mut events = ApplyFlags::empty();
        if slot.subscribers.is_empty() {
            events |= ApplyFlags::SUBSCRIBE;
        }

        if slot.subscribers.push(listener).is_err() {
            log_warn!(
                "enable: vsensor {} subscriber table full ({})",
                vsensor.index,
                MAX_SUBSCRIBERS
            );
            return;
        }

        log_debug!("listener {} enabled on vsensor {}", listener.index, vsensor.index);
        self.dispatch(listener, &ListenerEvent::HasSubscribed);
        self.apply(vsensor, listener, events, ApplyFlags::RI | ApplyFlags::MRL);
    }

    /// Unsubscribe the listener from its VSensor.
    ///
    /// When the last listener leaves, rates drop to 0 without any rate event
    /// and the producer receives `UNSUBSCRIBE` while the leaving listener is
    /// still reachable by `notify` (so final samples can be flushed to it).
    pub fn disable(&mut self, listener: ListenerId) {
        let Some(vsensor) = self.valid_listener(listener) else {
            log_warn!("disable: invalid listener {}", listener.index);
            return;
        };
        let Some(slot) = self.slot_mut(vsensor) else {
            return;
        };
        let Some(position) = slot.subscribers.iter().position(|l| *l == listener) else {
            return;
        };

        slot.subscribers.remove(position);
        let last = slot.subscribers.is_empty();

        if last {
            self.apply(vsensor, listener, ApplyFlags::UNSUBSCRIBE, ApplyFlags::empty());

            let previous = self
                .slot_mut(vsensor)
                .and_then(|slot| slot.draining.replace(listener));

            if let Err(e) = self.update(vsensor, VSensorEvent::Unsubscribe) {
                log_warn!("vsensor {} unsubscribe failed: {}", vsensor.index, e.as_str());
            }

            if let Some(slot) = self.slot_mut(vsensor) {
                slot.draining = previous;
            }
            log_debug!("vsensor {} has no more listeners", vsensor.index);
        } else {
            self.apply(vsensor, listener, ApplyFlags::empty(), ApplyFlags::empty());
        }

        self.dispatch(listener, &ListenerEvent::HasUnsubscribed);
    }

    /// Change the requested report interval (µs).
    ///
    /// While enabled, arbitration re-runs and this listener is always told the
    /// effective RI, even when the aggregate did not change.
    pub fn set_ri(&mut self, listener: ListenerId, ri: u32) {
        let Some(vsensor) = self.valid_listener(listener) else {
            log_warn!("set_ri: invalid listener {}", listener.index);
            return;
        };
        if let Some(entry) = self.listener_entry_mut(listener) {
            entry.requested_ri = ri;
        }
        if self.is_active(listener) {
            self.apply(vsensor, listener, ApplyFlags::empty(), ApplyFlags::RI);
        }
    }

    /// Change the requested max report latency (µs).
    pub fn set_mrl(&mut self, listener: ListenerId, mrl: u32) {
        let Some(vsensor) = self.valid_listener(listener) else {
            log_warn!("set_mrl: invalid listener {}", listener.index);
            return;
        };
        if let Some(entry) = self.listener_entry_mut(listener) {
            entry.requested_mrl = mrl;
        }
        if self.is_active(listener) {
            self.apply(vsensor, listener, ApplyFlags::empty(), ApplyFlags::MRL);
        }
    }

    /// VSensor the listener is bound to
    pub fn listener_vsensor(&self, listener: ListenerId) -> Option<VSensorId> {
        self.listener_entry(listener).map(|entry| entry.vsensor)
    }

    /// Opaque cookie given at attach time
    pub fn listener_arg(&self, listener: ListenerId) -> Option<usize> {
        self.listener_entry(listener).map(|entry| entry.arg)
    }

    pub fn requested_ri(&self, listener: ListenerId) -> Option<u32> {
        self.listener_entry(listener).map(|entry| entry.requested_ri)
    }

    pub fn requested_mrl(&self, listener: ListenerId) -> Option<u32> {
        self.listener_entry(listener).map(|entry| entry.requested_mrl)
    }

    /// True while the listener is in its VSensor's subscriber set
    pub fn is_active(&self, listener: ListenerId) -> bool {
        self.listener_entry(listener)
            .and_then(|entry| self.slot(entry.vsensor))
            .is_some_and(|slot| slot.subscribers.contains(&listener))
    }

    pub(super) fn listener_entry(&self, listener: ListenerId) -> Option<&ListenerEntry> {
        self.listeners
            .get(usize::from(listener.index))
            .filter(|slot| slot.generation == listener.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn listener_entry_mut(&mut self, listener: ListenerId) -> Option<&mut ListenerEntry> {
        self.listeners
            .get_mut(usize::from(listener.index))
            .filter(|slot| slot.generation == listener.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    /// VSensor of a listener that may act on it: live handle, live VSensor,
    /// VSensor not in setup error.
    fn valid_listener(&self, listener: ListenerId) -> Option<VSensorId> {
        let vsensor = self.listener_entry(listener)?.vsensor;
        let slot = self.slot(vsensor)?;
        (slot.status != SetupStatus::SetupError).then_some(vsensor)
    }

    /// Invoke one listener's handler
    pub(super) fn dispatch(&mut self, listener: ListenerId, event: &ListenerEvent) {
        let Some(handler) = self
            .listener_entry(listener)
            .map(|entry| Rc::clone(&entry.handler))
        else {
            return;
        };
        handler.handle(self, listener, event);
    }

    fn alloc_listener(&mut self, entry: ListenerEntry) -> Result<ListenerId> {
        if let Some(index) = self.free_listeners.pop() {
            let slot = &mut self.listeners[usize::from(index)];
            slot.entry = Some(entry);
            return Ok(ListenerId {
                index,
                generation: slot.generation,
            });
        }

        if self.listeners.len() >= self.config.max_listeners
            || self.listeners.len() >= usize::from(u16::MAX)
        {
            log_warn!("listener arena full ({} entries)", self.listeners.len());
            return Err(VSensorError::HubFull);
        }

        let index = self.listeners.len() as u16;
        self.listeners.push(ListenerSlot {
            generation: 0,
            entry: Some(entry),
        });
        Ok(ListenerId {
            index,
            generation: 0,
        })
    }

    fn free_listener(&mut self, listener: ListenerId) {
        if let Some(slot) = self
            .listeners
            .get_mut(usize::from(listener.index))
            .filter(|slot| slot.generation == listener.generation)
        {
            slot.entry = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free_listeners.push(listener.index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vsensor::mock::{EventLog, MockProducer, ProducerCall};
    use core::cell::{Cell, RefCell};
    use nalgebra::Vector3;

    fn register(hub: &mut VSensorHub, min_ri: u32) -> (Rc<MockProducer>, VSensorId) {
        let producer = Rc::new(MockProducer::new());
        let id = hub
            .register_vsensor(
                producer.clone(),
                SensorType::Accelerometer,
                16,
                Some(VSensorAttr::new(min_ri)),
            )
            .unwrap();
        (producer, id)
    }

    fn sample(timestamp_us: u64) -> SensorData {
        SensorData::Vector {
            timestamp_us,
            value: Vector3::new(0.0, 0.0, 9.8),
            accuracy: 3,
        }
    }

    fn listener_with_ri(
        hub: &mut VSensorHub,
        vsensor: VSensorId,
        log: &Rc<EventLog>,
        ri: u32,
    ) -> ListenerId {
        let listener = hub.attach(vsensor, Some(log.handler()), 0).unwrap();
        hub.set_ri(listener, ri);
        listener
    }

    // ========================================================================
    // Setup
    // ========================================================================

    #[test]
    fn test_setup_runs_once() {
        let mut hub = VSensorHub::new();
        let (producer, id) = register(&mut hub, 1000);

        assert_eq!(hub.status(id), Some(SetupStatus::NotSetup));
        hub.setup(id).unwrap();
        hub.setup(id).unwrap();
        hub.attach(id, None, 0).unwrap();

        assert_eq!(producer.count(ProducerCall::Setup), 1);
        assert_eq!(hub.status(id), Some(SetupStatus::SetupOk));
    }

    #[test]
    fn test_unknown_kind_always_fails_attach() {
        let mut hub = VSensorHub::new();
        let producer = Rc::new(MockProducer::new());
        let id = hub
            .register_vsensor(producer.clone(), SensorType::Unknown, 0, None)
            .unwrap();

        let log = Rc::new(EventLog::new());
        assert_eq!(
            hub.attach(id, Some(log.handler()), 0),
            Err(VSensorError::Uninitialized)
        );
        assert_eq!(hub.attach(id, None, 7), Err(VSensorError::Uninitialized));
        assert!(producer.calls().is_empty());
        assert_eq!(hub.status(id), Some(SetupStatus::NotSetup));
    }

    #[test]
    fn test_setup_error_is_sticky() {
        let mut hub = VSensorHub::new();
        let producer = Rc::new(MockProducer::failing_setup(VSensorError::Producer(-3)));
        let id = hub
            .register_vsensor(producer.clone(), SensorType::Gyroscope, 16, None)
            .unwrap();

        assert_eq!(hub.attach(id, None, 0), Err(VSensorError::SetupFailed));
        assert_eq!(hub.attach(id, None, 0), Err(VSensorError::SetupFailed));
        assert_eq!(producer.count(ProducerCall::Setup), 1);
        assert_eq!(hub.status(id), Some(SetupStatus::SetupError));
    }

    #[test]
    fn test_reinit_clears_setup_error() {
        let mut hub = VSensorHub::new();
        let broken = Rc::new(MockProducer::failing_setup(VSensorError::Producer(-1)));
        let id = hub
            .register_vsensor(broken, SensorType::Gyroscope, 16, None)
            .unwrap();
        assert!(hub.attach(id, None, 0).is_err());

        let fixed = Rc::new(MockProducer::new());
        let new_id = hub
            .reinit_vsensor(id, fixed.clone(), SensorType::Gyroscope, 16, None)
            .unwrap();

        assert!(!hub.contains_vsensor(id));
        assert_eq!(hub.status(new_id), Some(SetupStatus::NotSetup));
        assert!(hub.attach(new_id, None, 0).is_ok());
        assert_eq!(fixed.count(ProducerCall::Setup), 1);
    }

    #[test]
    fn test_reinit_refused_while_subscribed() {
        let mut hub = VSensorHub::new();
        let (_producer, id) = register(&mut hub, 1000);
        let listener = hub.attach(id, None, 0).unwrap();
        hub.enable(listener);

        let other = Rc::new(MockProducer::new());
        assert_eq!(
            hub.reinit_vsensor(id, other, SensorType::Accelerometer, 16, None),
            Err(VSensorError::Busy)
        );
    }

    #[test]
    fn test_reinit_invalidates_listeners() {
        let mut hub = VSensorHub::new();
        let (_producer, id) = register(&mut hub, 1000);
        let listener = hub.attach(id, None, 0).unwrap();

        let other = Rc::new(MockProducer::new());
        let new_id = hub
            .reinit_vsensor(id, other.clone(), SensorType::Accelerometer, 16, None)
            .unwrap();

        hub.enable(listener);
        assert!(!hub.is_active(listener));
        assert_eq!(hub.subscriber_count(new_id), 0);
        assert!(other.calls().is_empty());
    }

    // ========================================================================
    // Rate arbitration
    // ========================================================================

    #[test]
    fn test_single_listener_clamped_to_floor() {
        let mut hub = VSensorHub::new();
        let (producer, id) = register(&mut hub, 1000);
        let log = Rc::new(EventLog::new());
        let listener = listener_with_ri(&mut hub, id, &log, 500);

        hub.enable(listener);

        assert_eq!(hub.effective_ri(id), Some(1000));
        assert_eq!(log.effective_ri_for(listener), [1000]);
        assert_eq!(
            producer.calls(),
            [
                ProducerCall::Setup,
                ProducerCall::RequestedRi(1000),
                ProducerCall::RequestedMrl(0),
                ProducerCall::Subscribe,
            ]
        );
    }

    #[test]
    fn test_has_subscribed_precedes_rate_events() {
        let mut hub = VSensorHub::new();
        let (_producer, id) = register(&mut hub, 1000);
        let log = Rc::new(EventLog::new());
        let listener = listener_with_ri(&mut hub, id, &log, 2000);
        hub.set_mrl(listener, 50_000);

        hub.enable(listener);

        assert_eq!(
            log.events(),
            [
                ListenerEvent::HasSubscribed,
                ListenerEvent::NewEffectiveRi(2000),
                ListenerEvent::NewEffectiveMrl(50_000),
            ]
        );
    }

    #[test]
    fn test_second_listener_below_floor() {
        let mut hub = VSensorHub::new();
        let (_producer, id) = register(&mut hub, 1000);
        let log = Rc::new(EventLog::new());
        let first = listener_with_ri(&mut hub, id, &log, 500);
        let second = listener_with_ri(&mut hub, id, &log, 200);

        hub.enable(first);
        hub.enable(second);

        assert_eq!(hub.effective_ri(id), Some(1000));
        assert_eq!(log.effective_ri_for(first), [1000]);
        // nothing changed, but the newcomer still gets an acknowledgment
        assert_eq!(log.effective_ri_for(second), [1000]);
    }

    #[test]
    fn test_second_listener_lowers_rate_for_everyone() {
        let mut hub = VSensorHub::new();
        let (_producer, id) = register(&mut hub, 100);
        let log = Rc::new(EventLog::new());
        let first = listener_with_ri(&mut hub, id, &log, 500);
        let second = listener_with_ri(&mut hub, id, &log, 200);

        hub.enable(first);
        hub.enable(second);

        assert_eq!(hub.effective_ri(id), Some(200));
        assert_eq!(log.effective_ri_for(first), [500, 200]);
        assert_eq!(log.effective_ri_for(second), [200]);
    }

    #[test]
    fn test_effective_ri_tracks_active_set() {
        let mut hub = VSensorHub::new();
        let (_producer, id) = register(&mut hub, 300);
        let requests = [4000, 700, 250, 9000];
        let listeners: Vec<ListenerId> = requests
            .iter()
            .map(|ri| {
                let listener = hub.attach(id, None, 0).unwrap();
                hub.set_ri(listener, *ri);
                listener
            })
            .collect();

        let expected = |active: &[usize]| -> u32 {
            active
                .iter()
                .map(|i| requests[*i])
                .min()
                .map_or(0, |ri| ri.max(300))
        };

        let mut active = Vec::new();
        for (i, listener) in listeners.iter().enumerate() {
            hub.enable(*listener);
            active.push(i);
            assert_eq!(hub.effective_ri(id), Some(expected(&active)));
        }
        for (i, listener) in listeners.iter().enumerate() {
            hub.disable(*listener);
            active.retain(|a| *a != i);
            assert_eq!(hub.effective_ri(id), Some(expected(&active)));
        }
        assert_eq!(hub.effective_ri(id), Some(0));
    }

    #[test]
    fn test_mrl_minimum_wins() {
        let mut hub = VSensorHub::new();
        let (producer, id) = register(&mut hub, 1000);
        let a = hub.attach(id, None, 0).unwrap();
        let b = hub.attach(id, None, 0).unwrap();
        hub.set_mrl(a, 100_000);
        hub.set_mrl(b, 20_000);

        hub.enable(a);
        hub.enable(b);

        assert_eq!(hub.effective_mrl(id), Some(20_000));
        assert_eq!(producer.count(ProducerCall::RequestedMrl(20_000)), 1);
    }

    #[test]
    fn test_set_ri_on_disabled_listener_is_silent() {
        let mut hub = VSensorHub::new();
        let (producer, id) = register(&mut hub, 1000);
        let log = Rc::new(EventLog::new());
        let listener = hub.attach(id, Some(log.handler()), 0).unwrap();
        producer.clear_calls();

        hub.set_ri(listener, 5000);
        hub.set_mrl(listener, 10_000);

        assert!(producer.calls().is_empty());
        assert!(log.is_empty());
        assert_eq!(hub.effective_ri(id), Some(0));
        assert_eq!(hub.requested_ri(listener), Some(5000));

        hub.enable(listener);
        assert_eq!(hub.effective_ri(id), Some(5000));
        assert_eq!(hub.effective_mrl(id), Some(10_000));
    }

    #[test]
    fn test_set_ri_always_acknowledged() {
        let mut hub = VSensorHub::new();
        let (producer, id) = register(&mut hub, 1000);
        let log = Rc::new(EventLog::new());
        let fast = listener_with_ri(&mut hub, id, &log, 1000);
        let slow = listener_with_ri(&mut hub, id, &log, 8000);
        hub.enable(fast);
        hub.enable(slow);
        log.clear();
        producer.clear_calls();

        hub.set_ri(slow, 4000);

        assert!(producer.calls().is_empty());
        assert_eq!(log.events_for(slow), [ListenerEvent::NewEffectiveRi(1000)]);
        assert!(log.events_for(fast).is_empty());
    }

    #[test]
    fn test_set_mrl_always_acknowledged() {
        let mut hub = VSensorHub::new();
        let (producer, id) = register(&mut hub, 1000);
        let log = Rc::new(EventLog::new());
        let eager = listener_with_ri(&mut hub, id, &log, 1000);
        let lazy = listener_with_ri(&mut hub, id, &log, 1000);
        hub.set_mrl(eager, 10_000);
        hub.set_mrl(lazy, 80_000);
        hub.enable(eager);
        hub.enable(lazy);
        assert_eq!(hub.effective_mrl(id), Some(10_000));
        log.clear();
        producer.clear_calls();

        hub.set_mrl(lazy, 40_000);

        assert!(producer.calls().is_empty());
        assert_eq!(log.events_for(lazy), [ListenerEvent::NewEffectiveMrl(10_000)]);
        assert!(log.events_for(eager).is_empty());
        assert_eq!(hub.effective_mrl(id), Some(10_000));
    }

    #[test]
    fn test_producer_override_reaches_listeners() {
        let mut hub = VSensorHub::new();
        let (producer, id) = register(&mut hub, 1000);
        producer.set_ri_override(Some(2500));
        let log = Rc::new(EventLog::new());
        let a = listener_with_ri(&mut hub, id, &log, 2000);
        let b = listener_with_ri(&mut hub, id, &log, 3000);

        hub.enable(a);
        assert_eq!(hub.effective_ri(id), Some(2500));
        assert_eq!(log.effective_ri_for(a), [2500]);

        // aggregate stays at 2000 requested, producer keeps applying 2500
        hub.enable(b);
        assert_eq!(log.effective_ri_for(a), [2500, 2500]);
        assert_eq!(log.effective_ri_for(b), [2500]);
    }

    // ========================================================================
    // Subscription lifecycle
    // ========================================================================

    #[test]
    fn test_disable_last_listener() {
        let mut hub = VSensorHub::new();
        let (producer, id) = register(&mut hub, 1000);
        let log = Rc::new(EventLog::new());
        let listener = listener_with_ri(&mut hub, id, &log, 5000);
        hub.set_mrl(listener, 1000);
        hub.enable(listener);
        log.clear();

        hub.disable(listener);

        assert_eq!(hub.effective_ri(id), Some(0));
        assert_eq!(hub.effective_mrl(id), Some(0));
        assert_eq!(producer.count(ProducerCall::Unsubscribe), 1);
        assert_eq!(log.events(), [ListenerEvent::HasUnsubscribed]);
        assert!(!hub.is_active(listener));
    }

    /// Emits one final sample while handling `UNSUBSCRIBE`
    struct FlushOnUnsubscribe {
        unsubscribes: Cell<u32>,
    }

    impl VSensorProducer for FlushOnUnsubscribe {
        fn update(
            &self,
            hub: &mut VSensorHub,
            id: VSensorId,
            event: VSensorEvent<'_>,
        ) -> Result<()> {
            match event {
                VSensorEvent::Unsubscribe => {
                    self.unsubscribes.set(self.unsubscribes.get() + 1);
                    hub.notify_data(id, sample(42));
                    Ok(())
                }
                VSensorEvent::Setup | VSensorEvent::Subscribe => Ok(()),
                _ => Err(VSensorError::Unsupported),
            }
        }
    }

    #[test]
    fn test_last_listener_reachable_during_unsubscribe() {
        let mut hub = VSensorHub::new();
        let producer = Rc::new(FlushOnUnsubscribe {
            unsubscribes: Cell::new(0),
        });
        let id = hub
            .register_vsensor(producer.clone(), SensorType::Accelerometer, 16, None)
            .unwrap();
        let log = Rc::new(EventLog::new());
        let listener = hub.attach(id, Some(log.handler()), 0).unwrap();
        hub.enable(listener);
        log.clear();

        hub.disable(listener);

        assert_eq!(producer.unsubscribes.get(), 1);
        assert_eq!(
            log.events(),
            [
                ListenerEvent::NewData(sample(42)),
                ListenerEvent::HasUnsubscribed
            ]
        );
        assert_eq!(hub.subscriber_count(id), 0);

        // not reachable anymore once removal is final
        hub.notify_data(id, sample(43));
        assert_eq!(log.data_count(), 1);
    }

    #[test]
    fn test_disable_one_of_many() {
        let mut hub = VSensorHub::new();
        let (producer, id) = register(&mut hub, 100);
        let log = Rc::new(EventLog::new());
        let a = listener_with_ri(&mut hub, id, &log, 400);
        let b = listener_with_ri(&mut hub, id, &log, 200);
        hub.enable(a);
        hub.enable(b);
        log.clear();

        hub.disable(b);

        assert_eq!(hub.effective_ri(id), Some(400));
        assert_eq!(producer.count(ProducerCall::Unsubscribe), 0);
        assert_eq!(log.events_for(a), [ListenerEvent::NewEffectiveRi(400)]);
        assert_eq!(log.events_for(b), [ListenerEvent::HasUnsubscribed]);
    }

    #[test]
    fn test_enable_and_disable_are_idempotent() {
        let mut hub = VSensorHub::new();
        let (producer, id) = register(&mut hub, 1000);
        let log = Rc::new(EventLog::new());
        let listener = hub.attach(id, Some(log.handler()), 0).unwrap();

        hub.disable(listener);
        assert!(log.is_empty());

        hub.enable(listener);
        let after_first = log.len();
        hub.enable(listener);
        assert_eq!(log.len(), after_first);
        assert_eq!(producer.count(ProducerCall::Subscribe), 1);

        hub.disable(listener);
        hub.disable(listener);
        assert_eq!(producer.count(ProducerCall::Unsubscribe), 1);
    }

    #[test]
    fn test_resubscribe_after_unsubscribe() {
        let mut hub = VSensorHub::new();
        let (producer, id) = register(&mut hub, 1000);
        let listener = hub.attach(id, None, 0).unwrap();

        hub.enable(listener);
        hub.disable(listener);
        hub.enable(listener);

        assert_eq!(producer.count(ProducerCall::Subscribe), 2);
        assert_eq!(producer.count(ProducerCall::Setup), 1);
        assert_eq!(hub.effective_ri(id), Some(1000));
    }

    #[test]
    fn test_notify_in_enable_order() {
        let mut hub = VSensorHub::new();
        let (_producer, id) = register(&mut hub, 1000);
        let order = Rc::new(RefCell::new(Vec::new()));
        let listeners: Vec<ListenerId> = (0..4)
            .map(|arg| {
                let order = order.clone();
                let handler = handler_fn(move |hub, listener, event| {
                    if let ListenerEvent::NewData(_) = event {
                        order.borrow_mut().push(hub.listener_arg(listener).unwrap());
                    }
                });
                hub.attach(id, Some(handler), arg).unwrap()
            })
            .collect();
        for listener in listeners.iter().rev() {
            hub.enable(*listener);
        }

        hub.notify_data(id, sample(1));

        assert_eq!(*order.borrow(), [3, 2, 1, 0]);
    }

    #[test]
    fn test_listener_disabled_mid_notify_is_skipped() {
        let mut hub = VSensorHub::new();
        let (_producer, id) = register(&mut hub, 1000);
        let log = Rc::new(EventLog::new());
        let victim = Rc::new(Cell::new(None::<ListenerId>));

        let killer = {
            let victim = victim.clone();
            handler_fn(move |hub, _listener, event| {
                if let (ListenerEvent::NewData(_), Some(v)) = (event, victim.get()) {
                    hub.disable(v);
                }
            })
        };
        let first = hub.attach(id, Some(killer), 0).unwrap();
        let second = hub.attach(id, Some(log.handler()), 0).unwrap();
        victim.set(Some(second));
        hub.enable(first);
        hub.enable(second);
        log.clear();

        hub.notify_data(id, sample(5));

        assert_eq!(log.data_count(), 0);
        assert_eq!(log.events_for(second), [ListenerEvent::HasUnsubscribed]);
    }

    #[test]
    fn test_subscriber_table_full() {
        let mut hub = VSensorHub::new();
        let (_producer, id) = register(&mut hub, 1000);
        let listeners: Vec<ListenerId> = (0..=MAX_SUBSCRIBERS)
            .map(|_| hub.attach(id, None, 0).unwrap())
            .collect();

        for listener in &listeners {
            hub.enable(*listener);
        }

        assert_eq!(hub.subscriber_count(id), MAX_SUBSCRIBERS);
        assert!(!hub.is_active(listeners[MAX_SUBSCRIBERS]));
    }

    #[test]
    fn test_destroy_listener() {
        let mut hub = VSensorHub::new();
        let (_producer, id) = register(&mut hub, 1000);
        let listener = hub.attach(id, None, 9).unwrap();
        hub.enable(listener);

        assert_eq!(
            hub.destroy_listener(listener),
            Err(VSensorError::ListenerActive)
        );

        hub.disable(listener);
        hub.destroy_listener(listener).unwrap();
        assert_eq!(hub.listener_arg(listener), None);
        assert_eq!(
            hub.destroy_listener(listener),
            Err(VSensorError::InvalidHandle)
        );

        // the slot is reused under a new generation
        let reused = hub.attach(id, None, 1).unwrap();
        assert_eq!(reused.index(), listener.index());
        assert_ne!(reused, listener);
        hub.enable(listener);
        assert!(!hub.is_active(reused));
    }

    #[test]
    fn test_arena_limits() {
        let mut hub = VSensorHub::with_config(HubConfig {
            max_vsensors: 1,
            max_listeners: 2,
            default_attr: VSensorAttr::default(),
        });
        let (_producer, id) = register(&mut hub, 1000);
        let other = Rc::new(MockProducer::new());
        assert_eq!(
            hub.register_vsensor(other, SensorType::Gyroscope, 16, None)
                .err(),
            Some(VSensorError::HubFull)
        );

        hub.attach(id, None, 0).unwrap();
        hub.attach(id, None, 0).unwrap();
        assert_eq!(hub.attach(id, None, 0), Err(VSensorError::HubFull));
    }

    #[test]
    fn test_failed_attach_releases_slot() {
        let mut hub = VSensorHub::with_config(HubConfig {
            max_vsensors: 4,
            max_listeners: 1,
            default_attr: VSensorAttr::default(),
        });
        let broken = Rc::new(MockProducer::failing_setup(VSensorError::NoData));
        let bad = hub
            .register_vsensor(broken, SensorType::Pressure, 4, None)
            .unwrap();
        let (_producer, good) = register(&mut hub, 1000);

        assert!(hub.attach(bad, None, 0).is_err());
        assert!(hub.attach(good, None, 0).is_ok());
    }

    // ========================================================================
    // Producer requests
    // ========================================================================

    #[test]
    fn test_get_data() {
        let mut hub = VSensorHub::new();
        let (producer, id) = register(&mut hub, 1000);

        assert_eq!(hub.get_data(id), Err(VSensorError::NoData));
        producer.set_sample(Some(sample(10)));
        assert_eq!(hub.get_data(id), Ok(sample(10)));
    }

    #[test]
    fn test_flush_delivers_then_completes() {
        let mut hub = VSensorHub::new();
        let (producer, id) = register(&mut hub, 1000);
        producer.set_sample(Some(sample(77)));
        let log = Rc::new(EventLog::new());
        let listener = hub.attach(id, Some(log.handler()), 0).unwrap();
        hub.enable(listener);
        log.clear();

        hub.flush(id).unwrap();

        assert_eq!(
            log.events(),
            [
                ListenerEvent::NewData(sample(77)),
                ListenerEvent::FlushComplete
            ]
        );
    }

    #[test]
    fn test_config_round_trip() {
        let mut hub = VSensorHub::new();
        let (_producer, id) = register(&mut hub, 1000);
        let log = Rc::new(EventLog::new());
        let listener = hub.attach(id, Some(log.handler()), 0).unwrap();
        hub.enable(listener);
        log.clear();

        hub.set_config(id, &SensorConfig::FullScaleRange(8)).unwrap();
        assert_eq!(
            log.events(),
            [ListenerEvent::NewConfig(SensorConfig::FullScaleRange(8))]
        );

        let mut fsr = SensorConfig::FullScaleRange(0);
        hub.get_config(id, &mut fsr).unwrap();
        assert_eq!(fsr, SensorConfig::FullScaleRange(8));

        let mut bandwidth = SensorConfig::Bandwidth(0);
        assert_eq!(
            hub.get_config(id, &mut bandwidth),
            Err(VSensorError::NoData)
        );
    }

    #[test]
    fn test_custom_event_errors_propagate() {
        let mut hub = VSensorHub::new();
        let (producer, id) = register(&mut hub, 1000);
        let event = CustomEvent::new(40, 1).unwrap();

        assert_eq!(hub.custom(id, event), Err(VSensorError::Unsupported));
        assert_eq!(producer.count(ProducerCall::Custom(40)), 1);
    }

    #[test]
    fn test_stale_handles_are_ignored() {
        let mut hub = VSensorHub::new();
        let (producer, id) = register(&mut hub, 1000);
        let stale = VSensorId {
            index: id.index,
            generation: id.generation + 1,
        };

        assert_eq!(hub.setup(stale), Err(VSensorError::InvalidHandle));
        assert_eq!(hub.attach(stale, None, 0), Err(VSensorError::InvalidHandle));
        hub.notify_data(stale, sample(0));
        hub.set_effective_ri(stale, 5);

        let listener = ListenerId {
            index: 12,
            generation: 0,
        };
        hub.enable(listener);
        hub.disable(listener);
        hub.set_ri(listener, 10);
        assert!(producer.calls().is_empty());
    }

    // ========================================================================
    // Re-entrancy
    // ========================================================================

    /// Derived sensor forwarding the samples of one upstream VSensor
    struct Relay {
        upstream: Cell<Option<VSensorId>>,
        listener: Cell<Option<ListenerId>>,
        setups: Cell<u32>,
    }

    impl Relay {
        fn new() -> Self {
            Self {
                upstream: Cell::new(None),
                listener: Cell::new(None),
                setups: Cell::new(0),
            }
        }
    }

    impl VSensorProducer for Relay {
        fn update(
            &self,
            hub: &mut VSensorHub,
            id: VSensorId,
            event: VSensorEvent<'_>,
        ) -> Result<()> {
            match event {
                VSensorEvent::Setup => {
                    self.setups.set(self.setups.get() + 1);
                    if let Some(upstream) = self.upstream.get() {
                        let forward = handler_fn(move |hub, _listener, event| {
                            if let ListenerEvent::NewData(data) = event {
                                hub.notify_data(id, *data);
                            }
                        });
                        let listener = hub.attach(upstream, Some(forward), 0)?;
                        self.listener.set(Some(listener));
                    }
                    Ok(())
                }
                VSensorEvent::Subscribe => {
                    if let Some(listener) = self.listener.get() {
                        hub.enable(listener);
                    }
                    Ok(())
                }
                VSensorEvent::Unsubscribe => {
                    if let Some(listener) = self.listener.get() {
                        hub.disable(listener);
                    }
                    Ok(())
                }
                VSensorEvent::NewRequestedRi(ri) => {
                    if let Some(listener) = self.listener.get() {
                        hub.set_ri(listener, ri);
                    }
                    Ok(())
                }
                _ => Err(VSensorError::Unsupported),
            }
        }
    }

    fn register_relay(hub: &mut VSensorHub) -> (Rc<Relay>, VSensorId) {
        let relay = Rc::new(Relay::new());
        let id = hub
            .register_vsensor(relay.clone(), SensorType::Gravity, 16, Some(VSensorAttr::new(100)))
            .unwrap();
        (relay, id)
    }

    #[test]
    fn test_chain_propagates_subscription_and_data() {
        let mut hub = VSensorHub::new();
        let (raw, raw_id) = register(&mut hub, 100);
        let (relay, relay_id) = register_relay(&mut hub);
        relay.upstream.set(Some(raw_id));

        let log = Rc::new(EventLog::new());
        let app = hub.attach(relay_id, Some(log.handler()), 0).unwrap();
        assert_eq!(hub.status(raw_id), Some(SetupStatus::SetupOk));
        assert_eq!(raw.count(ProducerCall::Subscribe), 0);

        hub.set_ri(app, 5000);
        hub.enable(app);
        assert_eq!(raw.count(ProducerCall::Subscribe), 1);
        assert_eq!(hub.effective_ri(raw_id), Some(5000));

        hub.notify_data(raw_id, sample(99));
        assert_eq!(log.data_count(), 1);

        hub.disable(app);
        assert_eq!(raw.count(ProducerCall::Unsubscribe), 1);
        assert_eq!(hub.effective_ri(raw_id), Some(0));
    }

    #[test]
    fn test_upstream_setup_failure_propagates() {
        let mut hub = VSensorHub::new();
        let broken = Rc::new(MockProducer::failing_setup(VSensorError::Producer(-5)));
        let raw_id = hub
            .register_vsensor(broken, SensorType::RawAccelerometer, 12, None)
            .unwrap();
        let (relay, relay_id) = register_relay(&mut hub);
        relay.upstream.set(Some(raw_id));

        assert_eq!(hub.attach(relay_id, None, 0), Err(VSensorError::SetupFailed));
        assert_eq!(hub.status(raw_id), Some(SetupStatus::SetupError));
        assert_eq!(hub.status(relay_id), Some(SetupStatus::SetupError));
    }

    #[test]
    fn test_setup_cycle_terminates() {
        let mut hub = VSensorHub::new();
        let (a, a_id) = register_relay(&mut hub);
        let (b, b_id) = register_relay(&mut hub);
        a.upstream.set(Some(b_id));
        b.upstream.set(Some(a_id));

        let app = hub.attach(a_id, None, 0).unwrap();
        assert_eq!(a.setups.get(), 1);
        assert_eq!(b.setups.get(), 1);

        hub.enable(app);
        assert_eq!(hub.subscriber_count(a_id), 2);
        assert_eq!(hub.subscriber_count(b_id), 1);
        assert_eq!(hub.effective_ri(a_id), Some(100));
        assert_eq!(hub.effective_ri(b_id), Some(100));
    }
}
