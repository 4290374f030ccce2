//! Smart listeners
//!
//! A smart listener runs every incoming event through a [`Decimator`] before
//! the user handler sees it. The decimator may drop the event, forward it
//! (possibly rewritten), or forward it and ask to be called again, which lets
//! one input event fan out into several outputs (bounded by
//! [`MAX_DECIMATOR_ITERATIONS`]).

use alloc::rc::Rc;
use core::cell::{Ref, RefCell};

use super::error::Result;
use super::event::ListenerEvent;
use super::hub::{handler_fn, ListenerHandler, ListenerId, VSensorHub, VSensorId};

/// Upper bound on decimator passes for one incoming event
pub const MAX_DECIMATOR_ITERATIONS: usize = 10;

/// Outcome of one decimator pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decimation {
    /// Swallow the event
    Drop,
    /// Forward this event and stop
    Emit(ListenerEvent),
    /// Forward this event and run the decimator again
    EmitAndRepeat(ListenerEvent),
}

/// Event filter in front of a listener handler
pub trait Decimator {
    fn decimate(
        &mut self,
        hub: &VSensorHub,
        listener: ListenerId,
        event: &ListenerEvent,
    ) -> Decimation;
}

/// Listener handler wrapping a decimator and the user handler
pub struct SmartHandler<D> {
    decimator: RefCell<D>,
    handler: Rc<dyn ListenerHandler>,
}

impl<D: Decimator> SmartHandler<D> {
    pub fn new(decimator: D, handler: Rc<dyn ListenerHandler>) -> Self {
        Self {
            decimator: RefCell::new(decimator),
            handler,
        }
    }

    /// Current decimator state
    pub fn decimator(&self) -> Ref<'_, D> {
        self.decimator.borrow()
    }
}

impl<D: Decimator> ListenerHandler for SmartHandler<D> {
    fn handle(&self, hub: &mut VSensorHub, listener: ListenerId, event: &ListenerEvent) {
        for _ in 0..MAX_DECIMATOR_ITERATIONS {
            let decision = self.decimator.borrow_mut().decimate(hub, listener, event);
            match decision {
                Decimation::Drop => return,
                Decimation::Emit(out) => {
                    self.handler.handle(hub, listener, &out);
                    return;
                }
                Decimation::EmitAndRepeat(out) => self.handler.handle(hub, listener, &out),
            }
        }
        log_debug!(
            "listener {} decimator stopped after {} passes",
            listener.index(),
            MAX_DECIMATOR_ITERATIONS
        );
    }
}

/// Requested-interval-respecting decimator
///
/// When the effective RI of the VSensor is faster than what this listener
/// asked for, forwards only one `NEW_DATA` every `requested / effective`
/// events. The first sample after each effective-RI change is forwarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RirDecimator {
    count: u32,
    rate: u32,
}

impl RirDecimator {
    pub const fn new() -> Self {
        Self { count: 0, rate: 0 }
    }

    /// Current decimation factor (0 or 1 forwards everything)
    pub fn rate(&self) -> u32 {
        self.rate
    }
}

impl Decimator for RirDecimator {
    fn decimate(
        &mut self,
        hub: &VSensorHub,
        listener: ListenerId,
        event: &ListenerEvent,
    ) -> Decimation {
        match *event {
            ListenerEvent::NewEffectiveRi(effective) => {
                let requested = hub.requested_ri(listener).unwrap_or(0);
                if effective != 0 && effective < requested {
                    self.rate = requested / effective;
                    self.count = self.rate;
                } else {
                    self.rate = 0;
                    self.count = 0;
                }
            }
            ListenerEvent::NewData(_) => {
                self.count = self.count.saturating_add(1);
                if self.count < self.rate {
                    return Decimation::Drop;
                }
                self.count = 0;
            }
            _ => {}
        }
        Decimation::Emit(*event)
    }
}

impl VSensorHub {
    /// Attach a listener whose events go through `decimator` first.
    ///
    /// Without a decimator this is a plain [`attach`](VSensorHub::attach).
    pub fn attach_smart<D>(
        &mut self,
        vsensor: VSensorId,
        handler: Option<Rc<dyn ListenerHandler>>,
        arg: usize,
        decimator: Option<D>,
    ) -> Result<ListenerId>
    where
        D: Decimator + 'static,
    {
        match decimator {
            Some(decimator) => {
                let inner = handler.unwrap_or_else(|| handler_fn(|_, _, _| {}));
                let smart: Rc<dyn ListenerHandler> = Rc::new(SmartHandler::new(decimator, inner));
                self.attach(vsensor, Some(smart), arg)
            }
            None => self.attach(vsensor, handler, arg),
        }
    }

    /// Attach a smart listener using a [`RirDecimator`]
    pub fn attach_rir(
        &mut self,
        vsensor: VSensorId,
        handler: Option<Rc<dyn ListenerHandler>>,
        arg: usize,
    ) -> Result<ListenerId> {
        self.attach_smart(vsensor, handler, arg, Some(RirDecimator::new()))
    }
}
