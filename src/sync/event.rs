//! Event flags
//!
//! Every thread owns a mask of pending events. Events are posted directly to
//! a thread or broadcast by an [`EventSource`] to its registered
//! [`EventListener`]s, each listener maps the source onto its own event bits
//! and optionally filters on the flags carried by the broadcast.

use core::fmt;

use crate::cs_cell::CsCell;
use crate::error::{kassert, kcheck};
use crate::kernel::System;
use crate::port::Port;
use crate::thread::{ThreadId, ThreadState};
use crate::types::{
    event_mask, EventFlags, EventId, EventMask, Interval, MSG_OK, TIME_IMMEDIATE, TIME_INFINITE,
};

/// Event handler called by [`System::evt_dispatch`].
pub type EvHandler = fn(EventId);

/// Link between an event source and a listening thread.
pub struct EventListener {
    next: CsCell<Option<&'static EventListener>>,
    listener: CsCell<Option<ThreadId>>,
    events: CsCell<EventMask>,
    flags: CsCell<EventFlags>,
    wflags: CsCell<EventFlags>,
}

impl EventListener {
    pub const fn new() -> Self {
        Self {
            next: CsCell::new(None),
            listener: CsCell::new(None),
            events: CsCell::new(0),
            flags: CsCell::new(0),
            wflags: CsCell::new(0),
        }
    }

    /// Thread owning the listener.
    #[inline]
    pub fn listener(&self) -> Option<ThreadId> {
        self.listener.get()
    }

    /// Flags accumulated since the last read.
    #[inline]
    pub fn flags(&self) -> EventFlags {
        self.flags.get()
    }
}

impl Default for EventListener {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListener")
            .field("listener", &self.listener.get())
            .field("events", &self.events.get())
            .field("flags", &self.flags.get())
            .field("wflags", &self.wflags.get())
            .finish()
    }
}

/// Broadcaster of events, holds the list of its listeners.
pub struct EventSource {
    head: CsCell<Option<&'static EventListener>>,
}

impl EventSource {
    pub const fn new() -> Self {
        Self { head: CsCell::new(None) }
    }

    /// Whether at least one listener is registered.
    #[inline]
    pub fn is_listening(&self) -> bool {
        self.head.get().is_some()
    }
}

impl Default for EventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Port, const N: usize> System<P, N> {
    // ============ Registration ============

    /// Registers `elp` on `esp` for the current thread.
    ///
    /// A broadcast adds `events` to the thread when its flags intersect
    /// `wflags`, or when it carries no flags at all.
    pub fn evt_register_mask_with_flags(
        &mut self,
        esp: &EventSource,
        elp: &'static EventListener,
        events: EventMask,
        wflags: EventFlags,
    ) {
        self.lock();
        elp.next.set(esp.head.get());
        esp.head.set(Some(elp));
        elp.listener.set(Some(self.current));
        elp.events.set(events);
        elp.flags.set(0);
        elp.wflags.set(wflags);
        self.unlock();
    }

    /// Registers `elp` on `esp`, accepting every flag.
    #[inline]
    pub fn evt_register_mask(&mut self, esp: &EventSource, elp: &'static EventListener, events: EventMask) {
        self.evt_register_mask_with_flags(esp, elp, events, EventFlags::MAX);
    }

    /// Registers `elp` on `esp` posting the single event `eid`.
    #[inline]
    pub fn evt_register(&mut self, esp: &EventSource, elp: &'static EventListener, eid: EventId) {
        self.evt_register_mask(esp, elp, event_mask(eid));
    }

    /// Removes `elp` from `esp`, a listener not registered is ignored.
    pub fn evt_unregister(&mut self, esp: &EventSource, elp: &EventListener) {
        self.lock();
        match esp.head.get() {
            Some(first) if core::ptr::eq(first, elp) => esp.head.set(elp.next.get()),
            mut p => {
                while let Some(cur) = p {
                    match cur.next.get() {
                        Some(n) if core::ptr::eq(n, elp) => {
                            cur.next.set(elp.next.get());
                            break;
                        }
                        n => p = n,
                    }
                }
            }
        }
        self.unlock();
    }

    // ============ Posting ============

    /// Adds `events` to `tid`, waking it if its wait condition is met, I-class.
    pub fn evt_signal_i(&mut self, tid: ThreadId, events: EventMask) {
        self.dbg_check_class_i();
        kcheck!(self, tid.0 < N, "invalid thread");

        let tp = self.thd_mut(tid);
        tp.epmask |= events;
        let wake = match tp.state {
            ThreadState::WtOrEvt(m) => tp.epmask & m != 0,
            ThreadState::WtAndEvt(m) => tp.epmask & m == m,
            _ => false,
        };
        if wake {
            self.ready_i(tid, MSG_OK);
        }
    }

    /// Adds `events` to `tid` and reschedules.
    pub fn evt_signal(&mut self, tid: ThreadId, events: EventMask) {
        self.lock();
        self.evt_signal_i(tid, events);
        self.reschedule_s();
        self.unlock();
    }

    /// Broadcasts `flags` to every listener of `esp`, I-class.
    pub fn evt_broadcast_flags_i(&mut self, esp: &EventSource, flags: EventFlags) {
        self.dbg_check_class_i();

        let mut p = esp.head.get();
        while let Some(elp) = p {
            elp.flags.with(|f| *f |= flags);
            // A source without flags always signals.
            if flags == 0 || flags & elp.wflags.get() != 0 {
                if let Some(tid) = elp.listener.get() {
                    self.evt_signal_i(tid, elp.events.get());
                }
            }
            p = elp.next.get();
        }
    }

    /// Broadcasts `flags` to every listener of `esp` and reschedules.
    pub fn evt_broadcast_flags(&mut self, esp: &EventSource, flags: EventFlags) {
        self.lock();
        self.evt_broadcast_flags_i(esp, flags);
        self.reschedule_s();
        self.unlock();
    }

    #[inline]
    pub fn evt_broadcast_i(&mut self, esp: &EventSource) {
        self.evt_broadcast_flags_i(esp, 0);
    }

    #[inline]
    pub fn evt_broadcast(&mut self, esp: &EventSource) {
        self.evt_broadcast_flags(esp, 0);
    }

    // ============ Current thread mask ============

    /// Adds `events` to the current thread, returns the pending mask, I-class.
    pub fn evt_add_events_i(&mut self, events: EventMask) -> EventMask {
        let cur = self.current;
        let tp = self.thd_mut(cur);
        tp.epmask |= events;
        tp.epmask
    }

    /// Adds `events` to the current thread, returns the pending mask.
    pub fn evt_add_events(&mut self, events: EventMask) -> EventMask {
        self.lock();
        let m = self.evt_add_events_i(events);
        self.unlock();
        m
    }

    /// Pending events of the current thread.
    #[inline]
    pub fn evt_get_events_x(&self) -> EventMask {
        self.thd(self.current).epmask
    }

    /// Clears `events` from the current thread, returns the ones that were set, I-class.
    pub fn evt_get_and_clear_events_i(&mut self, events: EventMask) -> EventMask {
        let cur = self.current;
        let tp = self.thd_mut(cur);
        let m = tp.epmask & events;
        tp.epmask &= !events;
        m
    }

    /// Clears `events` from the current thread, returns the ones that were set.
    pub fn evt_get_and_clear_events(&mut self, events: EventMask) -> EventMask {
        self.lock();
        let m = self.evt_get_and_clear_events_i(events);
        self.unlock();
        m
    }

    /// Takes the flags accumulated by `elp`, filtered by its `wflags`, I-class.
    pub fn evt_get_and_clear_flags_i(&mut self, elp: &EventListener) -> EventFlags {
        elp.flags.take() & elp.wflags.get()
    }

    /// Takes the flags accumulated by `elp`, filtered by its `wflags`.
    pub fn evt_get_and_clear_flags(&mut self, elp: &EventListener) -> EventFlags {
        self.lock();
        let flags = self.evt_get_and_clear_flags_i(elp);
        self.unlock();
        flags
    }

    /// Calls the handler of every event in `events`, lowest id first.
    pub fn evt_dispatch(&mut self, handlers: &[Option<EvHandler>], mut events: EventMask) {
        let mut eid: EventId = 0;
        while events != 0 {
            if events & event_mask(eid) != 0 {
                let handler = handlers.get(eid as usize).copied().flatten();
                kassert!(self, handler.is_some(), "null handler");
                events &= !event_mask(eid);
                if let Some(h) = handler {
                    h(eid);
                }
            }
            eid += 1;
        }
    }

    // ============ Waiting ============

    /// Waits for one of `events`, serves and returns the lowest pending one.
    ///
    /// Returns 0 on timeout, or immediately with `TIME_IMMEDIATE` when none
    /// is pending.
    pub fn evt_wait_one_timeout(&mut self, events: EventMask, timeout: Interval) -> EventMask {
        let ctp = self.current;
        self.lock();
        let mut m = self.thd(ctp).epmask & events;
        if m == 0 {
            if timeout == TIME_IMMEDIATE
                || self.go_sleep_timeout_s(ThreadState::WtOrEvt(events), timeout) < MSG_OK
            {
                self.unlock();
                return 0;
            }
            m = self.thd(ctp).epmask & events;
        }
        // Lowest set bit.
        m ^= m & m.wrapping_sub(1);
        self.thd_mut(ctp).epmask &= !m;
        self.unlock();
        m
    }

    /// Waits for any of `mask`, serves and returns all pending ones.
    pub fn evt_wait_any_timeout(&mut self, mask: EventMask, timeout: Interval) -> EventMask {
        let ctp = self.current;
        self.lock();
        let mut m = self.thd(ctp).epmask & mask;
        if m == 0 {
            if timeout == TIME_IMMEDIATE
                || self.go_sleep_timeout_s(ThreadState::WtOrEvt(mask), timeout) < MSG_OK
            {
                self.unlock();
                return 0;
            }
            m = self.thd(ctp).epmask & mask;
        }
        self.thd_mut(ctp).epmask &= !m;
        self.unlock();
        m
    }

    /// Waits for all of `mask`, serves them and returns `mask`.
    pub fn evt_wait_all_timeout(&mut self, mask: EventMask, timeout: Interval) -> EventMask {
        let ctp = self.current;
        self.lock();
        if self.thd(ctp).epmask & mask != mask
            && (timeout == TIME_IMMEDIATE
                || self.go_sleep_timeout_s(ThreadState::WtAndEvt(mask), timeout) < MSG_OK)
        {
            self.unlock();
            return 0;
        }
        self.thd_mut(ctp).epmask &= !mask;
        self.unlock();
        mask
    }

    #[inline]
    pub fn evt_wait_one(&mut self, events: EventMask) -> EventMask {
        self.evt_wait_one_timeout(events, TIME_INFINITE)
    }

    #[inline]
    pub fn evt_wait_any(&mut self, mask: EventMask) -> EventMask {
        self.evt_wait_any_timeout(mask, TIME_INFINITE)
    }

    #[inline]
    pub fn evt_wait_all(&mut self, mask: EventMask) -> EventMask {
        self.evt_wait_all_timeout(mask, TIME_INFINITE)
    }
}
