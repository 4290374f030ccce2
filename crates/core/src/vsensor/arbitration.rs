//! Rate arbitration
//!
//! Aggregates the requests of all enabled listeners of a VSensor into one
//! effective report interval (RI) and max report latency (MRL):
//!
//! - effective RI = max(min requested RI, `min_ri` attribute)
//! - effective MRL = min requested MRL
//! - both are 0 when no listener is enabled
//!
//! The producer is told about the new requested values first and may override
//! the effective ones; listeners are then notified of what was actually applied.

use bitflags::bitflags;

use super::error::VSensorError;
use super::event::{ListenerEvent, VSensorEvent};
use super::hub::{ListenerId, VSensorAttr, VSensorHub, VSensorId};

bitflags! {
    /// Lifecycle events and rate parameters carried through one arbitration pass
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ApplyFlags: u8 {
        /// First listener joined
        const SUBSCRIBE = 1 << 0;
        /// Last listener left
        const UNSUBSCRIBE = 1 << 1;
        const RI = 1 << 2;
        const MRL = 1 << 3;
    }
}

/// Minimum requested `(ri, mrl)` over all requests, `None` when empty
pub fn min_request<I>(requests: I) -> Option<(u32, u32)>
where
    I: IntoIterator<Item = (u32, u32)>,
{
    requests
        .into_iter()
        .reduce(|(ri, mrl), (r, m)| (ri.min(r), mrl.min(m)))
}

/// Effective `(ri, mrl)` for a set of requests under `attr`
pub fn effective_rates<I>(requests: I, attr: VSensorAttr) -> (u32, u32)
where
    I: IntoIterator<Item = (u32, u32)>,
{
    match min_request(requests) {
        Some((ri, mrl)) => (ri.max(attr.min_ri), mrl),
        None => (0, 0),
    }
}

impl VSensorHub {
    /// One arbitration pass on `vsensor`, triggered by `listener`.
    ///
    /// `events` carries SUBSCRIBE/UNSUBSCRIBE. `force` names the parameters
    /// `listener` must hear about even when the aggregate did not move.
    pub(super) fn apply(
        &mut self,
        vsensor: VSensorId,
        listener: ListenerId,
        events: ApplyFlags,
        force: ApplyFlags,
    ) {
        let Some(slot) = self.slot(vsensor) else {
            return;
        };
        let requests = slot
            .subscribers
            .iter()
            .filter_map(|l| self.listener_entry(*l))
            .map(|entry| (entry.requested_ri, entry.requested_mrl));
        let (ri, mrl) = effective_rates(requests, slot.attr);

        let Some(slot) = self.slot_mut(vsensor) else {
            return;
        };
        let mut changed = ApplyFlags::empty();
        if slot.effective_ri != ri {
            slot.effective_ri = ri;
            changed |= ApplyFlags::RI;
        }
        if slot.effective_mrl != mrl {
            slot.effective_mrl = mrl;
            changed |= ApplyFlags::MRL;
        }

        if events.contains(ApplyFlags::SUBSCRIBE) {
            changed |= ApplyFlags::RI | ApplyFlags::MRL;
        }
        if events.contains(ApplyFlags::UNSUBSCRIBE) {
            changed.remove(ApplyFlags::RI | ApplyFlags::MRL);
        }

        log_trace!(
            "vsensor {} arbitration: ri={} mrl={} changed={}",
            vsensor.index(),
            ri,
            mrl,
            changed.bits()
        );

        if changed.contains(ApplyFlags::RI) {
            self.update_quiet(vsensor, VSensorEvent::NewRequestedRi(ri));
        }
        if changed.contains(ApplyFlags::MRL) {
            self.update_quiet(vsensor, VSensorEvent::NewRequestedMrl(mrl));
        }

        // the producer may have overridden what we computed
        let (applied_ri, applied_mrl) = match self.slot(vsensor) {
            Some(slot) => (slot.effective_ri, slot.effective_mrl),
            None => return,
        };
        if applied_ri != ri {
            changed |= ApplyFlags::RI;
        }
        if applied_mrl != mrl {
            changed |= ApplyFlags::MRL;
        }

        if changed.contains(ApplyFlags::RI) {
            self.notify(vsensor, ListenerEvent::NewEffectiveRi(applied_ri));
        }
        if changed.contains(ApplyFlags::MRL) {
            self.notify(vsensor, ListenerEvent::NewEffectiveMrl(applied_mrl));
        }

        // acquisition starts once the first rate is settled
        if events.contains(ApplyFlags::SUBSCRIBE) {
            self.update_quiet(vsensor, VSensorEvent::Subscribe);
        }

        if force.contains(ApplyFlags::RI) && !changed.contains(ApplyFlags::RI) {
            self.dispatch(listener, &ListenerEvent::NewEffectiveRi(applied_ri));
        }
        if force.contains(ApplyFlags::MRL) && !changed.contains(ApplyFlags::MRL) {
            self.dispatch(listener, &ListenerEvent::NewEffectiveMrl(applied_mrl));
        }
    }

    fn update_quiet(&mut self, vsensor: VSensorId, event: VSensorEvent<'_>) {
        let name = event.as_str();
        match self.update(vsensor, event) {
            Ok(()) | Err(VSensorError::Unsupported) => {}
            Err(e) => log_warn!("vsensor {} {} failed: {}", vsensor.index(), name, e.as_str()),
        }
    }
}
