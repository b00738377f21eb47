//! Thread management module
//!
//! Thread creation, termination, join and the suspend/resume rendezvous.
//! Sleeping lives in [`crate::time`], queue waits in [`crate::sync`].

mod tcb;

pub use tcb::{
    Thread, ThreadDescriptor, ThreadFn, ThreadId, ThreadReference, ThreadState, WorkingArea,
};

use crate::debug;
use crate::error::{kassert, kcheck};
use crate::kernel::System;
use crate::port::Port;
use crate::types::{Interval, Msg, Prio, MSG_OK, MSG_TIMEOUT, TIME_IMMEDIATE, TIME_INFINITE};

impl<P: Port, const N: usize> System<P, N> {
    /// Creates a thread in the slot selected by `tdp.prio`, I-class.
    ///
    /// The slot must be unused or hold a terminated thread. The thread is
    /// made ready but no reschedule is performed.
    pub fn thd_create_i(&mut self, tdp: &ThreadDescriptor) -> ThreadId {
        kcheck!(self, tdp.prio < N, "invalid priority");
        kcheck!(
            self,
            !tdp.wbase.is_null()
                && (tdp.wbase as usize) % P::WORKING_AREA_ALIGN == 0
                && (tdp.wbase as usize) % P::STACK_ALIGN == 0,
            "misaligned working area"
        );
        kcheck!(self, tdp.wend > tdp.wbase, "invalid working area");
        self.dbg_check_class_i();

        let tid = ThreadId(tdp.prio);
        kassert!(
            self,
            matches!(self.thd(tid).state, ThreadState::WtStart | ThreadState::Final(_)),
            "priority slot taken"
        );

        let tp = &mut self.threads[tid.0];
        tp.name = tdp.name;
        #[cfg(feature = "events")]
        {
            tp.epmask = 0;
        }
        #[cfg(feature = "dbg-stack-check")]
        {
            tp.wabase = tdp.wbase as usize;
        }
        unsafe {
            self.port
                .setup_context(&mut tp.ctx, tdp.wbase, tdp.wend, tdp.funcp, tdp.arg);
        }
        self.port.thread_init_hook(tid);
        debug!("nil: thread {} created at prio {}", tdp.name, tdp.prio);

        self.ready_i(tid, MSG_OK)
    }

    /// Creates a thread and reschedules.
    pub fn thd_create(&mut self, tdp: &ThreadDescriptor) -> ThreadId {
        self.lock();
        let tid = self.thd_create_i(tdp);
        self.reschedule_s();
        self.unlock();
        tid
    }

    /// Terminates the current thread with exit message `msg`.
    ///
    /// Threads blocked in [`System::thd_wait`] on it are woken with `msg`.
    /// On hardware the call never returns.
    pub fn thd_exit(&mut self, msg: Msg) {
        self.lock();
        let me = self.current;
        self.port.thread_exit_hook(me);
        debug!("nil: thread {} exits with {}", me.0, msg);

        #[cfg(feature = "waitexit")]
        for idx in 0..N {
            if self.threads[idx].state == ThreadState::WtExit(me) {
                self.ready_i(ThreadId(idx), msg);
            }
        }

        self.go_sleep_timeout_s(ThreadState::Final(msg), TIME_INFINITE);

        // Only ports returning from switch get here, as the incoming thread.
        kassert!(self, self.current != me, "zombies apocalypse");
        self.unlock();
    }

    /// Blocks until `tid` terminates, returns its exit message.
    #[cfg(feature = "waitexit")]
    pub fn thd_wait(&mut self, tid: ThreadId) -> Msg {
        kcheck!(self, tid.0 < N, "invalid thread");
        self.lock();
        let msg = match self.thd(tid).state {
            ThreadState::Final(msg) => msg,
            _ => self.go_sleep_timeout_s(ThreadState::WtExit(tid), TIME_INFINITE),
        };
        self.unlock();
        msg
    }

    /// Suspends the current thread on `trp`, S-class.
    ///
    /// The reference holds the thread until it is resumed or the timeout
    /// expires, whichever comes first clears it.
    pub fn thd_suspend_timeout_s(
        &mut self,
        trp: &'static ThreadReference,
        timeout: Interval,
    ) -> Msg {
        kassert!(self, trp.is_empty(), "not NULL");

        if timeout == TIME_IMMEDIATE {
            return MSG_TIMEOUT;
        }

        trp.set(Some(self.current));
        self.go_sleep_timeout_s(ThreadState::Suspended(trp), timeout)
    }

    /// Suspends the current thread on `trp` without timeout, S-class.
    #[inline]
    pub fn thd_suspend_s(&mut self, trp: &'static ThreadReference) -> Msg {
        self.thd_suspend_timeout_s(trp, TIME_INFINITE)
    }

    /// Wakes the thread suspended on `trp`, if any, I-class.
    pub fn thd_resume_i(&mut self, trp: &ThreadReference, msg: Msg) {
        if let Some(tid) = trp.take() {
            kassert!(
                self,
                matches!(self.thd(tid).state, ThreadState::Suspended(_)),
                "not suspended"
            );
            self.ready_i(tid, msg);
        }
    }

    /// Wakes the thread suspended on `trp`, if any, and reschedules.
    pub fn thd_resume_s(&mut self, trp: &ThreadReference, msg: Msg) {
        self.thd_resume_i(trp, msg);
        self.reschedule_s();
    }

    /// Wakes the thread suspended on `trp`, if any.
    pub fn thd_resume(&mut self, trp: &ThreadReference, msg: Msg) {
        self.lock();
        self.thd_resume_s(trp, msg);
        self.unlock();
    }

    /// The current thread.
    #[inline(always)]
    pub fn thd_get_self_x(&self) -> ThreadId {
        self.current
    }

    /// Priority of the current thread.
    #[inline(always)]
    pub fn thd_get_priority_x(&self) -> Prio {
        self.current.prio()
    }
}
