//! Scheduler module
//!
//! Fixed priority scheduling over the thread table. There is no ready list:
//! the highest priority ready thread is found by scanning the table from
//! slot 0, which is bounded by the compile-time thread count. `next` caches
//! the best candidate so that the preemption test is a single comparison.

use core::ptr::NonNull;

use crate::error::{kassert, kcheck};
#[cfg(feature = "dbg-stack-check")]
use crate::error::HaltReason;
use crate::kernel::System;
use crate::port::Port;
use crate::sync::queue::ThreadsQueue;
use crate::thread::{ThreadId, ThreadState};
use crate::types::{Cnt, Interval, Msg, TIME_INFINITE};
use crate::time::{time_add_x, time_is_in_range_x};

impl<P: Port, const N: usize> System<P, N> {
    /// First application thread, in priority order, matching `pred`.
    pub(crate) fn find_thread(&self, pred: impl Fn(&ThreadState) -> bool) -> Option<ThreadId> {
        self.threads
            .iter()
            .position(|tp| pred(&tp.state))
            .map(ThreadId)
    }

    /// Readies up to `-cnt` threads waiting on `tqp`, in priority order.
    ///
    /// Returns `cnt` increased by the number of readied threads, non negative
    /// values of `cnt` are returned untouched.
    pub(crate) fn ready_all(&mut self, tqp: &ThreadsQueue, mut cnt: Cnt, msg: Msg) -> Cnt {
        let mut idx = 0;
        while cnt < 0 {
            kassert!(self, idx < N, "pointer out of range");
            if idx >= N {
                break;
            }
            if self.threads[idx].state.waits_on(tqp) {
                cnt += 1;
                self.ready_i(ThreadId(idx), msg);
            }
            idx += 1;
        }
        cnt
    }

    /// Makes `tid` ready with wake-up message `msg`.
    ///
    /// Clears any armed timeout and moves `next` if `tid` has higher
    /// priority than the current candidate.
    pub fn ready_i(&mut self, tid: ThreadId, msg: Msg) -> ThreadId {
        self.dbg_check_class_i();
        kcheck!(self, tid.0 < N, "invalid thread");
        kassert!(self, !self.thd(tid).state.is_ready(), "already ready");
        kassert!(self, self.next <= self.current, "priority ordering");

        let tp = self.thd_mut(tid);
        tp.state = ThreadState::Ready(msg);
        tp.timeout = 0;
        if tid < self.next {
            self.next = tid;
        }
        tid
    }

    /// Whether a reschedule is required.
    #[inline(always)]
    pub fn is_resc_required_i(&self) -> bool {
        self.current != self.next
    }

    /// Whether the current thread must be preempted.
    #[inline(always)]
    pub fn is_preemption_required(&self) -> bool {
        self.is_resc_required_i()
    }

    /// Switches to `next`, the current thread stays ready.
    pub fn do_preemption(&mut self) {
        let otp = self.current;
        self.current = self.next;
        if otp == Self::IDLE {
            self.port.idle_leave_hook();
        }
        self.switch_to(self.next, otp);
    }

    /// Performs a reschedule if a higher priority thread is ready.
    pub fn reschedule_s(&mut self) {
        self.dbg_check_class_s();
        if self.is_resc_required_i() {
            self.do_preemption();
        }
    }

    /// Puts the current thread to sleep in `newstate`.
    ///
    /// Every blocking operation ends up here. A `timeout` other than
    /// `TIME_INFINITE` wakes the thread with `MSG_TIMEOUT` unless something
    /// readies it first. Returns the wake-up message.
    pub fn go_sleep_timeout_s(&mut self, newstate: ThreadState, timeout: Interval) -> Msg {
        self.dbg_check_class_s();
        let otp = self.current;
        kassert!(self, otp != Self::IDLE, "idle cannot sleep");

        self.thd_mut(otp).state = newstate;
        let timeout = self.arm_timeout(timeout);
        self.thd_mut(otp).timeout = timeout;

        // The idle slot is always ready, the scan cannot fall off the end.
        let ntp = self
            .find_thread(ThreadState::is_ready)
            .unwrap_or(Self::IDLE);
        self.current = ntp;
        self.next = ntp;
        if ntp == Self::IDLE {
            self.port.idle_enter_hook();
        }
        self.switch_to(ntp, otp);
        self.thd(self.current).msg()
    }

    /// Same as [`System::go_sleep_timeout_s`] without timeout.
    #[inline]
    pub fn go_sleep_s(&mut self, newstate: ThreadState) -> Msg {
        self.go_sleep_timeout_s(newstate, TIME_INFINITE)
    }

    /// Readies `tid` and reschedules.
    pub fn wakeup_s(&mut self, tid: ThreadId, msg: Msg) {
        self.ready_i(tid, msg);
        self.reschedule_s();
    }

    /// Converts a relative timeout into the value stored in the thread slot,
    /// programming the alarm in timer-delta mode.
    fn arm_timeout(&mut self, timeout: Interval) -> Interval {
        if P::ST_TIMEDELTA == 0 || timeout == TIME_INFINITE {
            return timeout;
        }

        // Leave enough time to program the alarm before the deadline.
        let timeout = timeout.max(P::ST_TIMEDELTA);
        let now = self.port.timer_get_time();
        let abstime = time_add_x(now, timeout);

        if self.lasttime == self.nexttime {
            // First thread asking for a timeout, no stored delta depends on
            // `lasttime` so it restarts from now.
            self.lasttime = now;
            self.port.timer_start_alarm(abstime);
            self.nexttime = abstime;
        } else if time_is_in_range_x(abstime, self.lasttime, self.nexttime) {
            // Earlier than the programmed deadline.
            self.port.timer_set_alarm(abstime);
            self.nexttime = abstime;
        }

        abstime.wrapping_sub(self.lasttime)
    }

    /// Low level switch from `otp` to `ntp`.
    fn switch_to(&mut self, ntp: ThreadId, otp: ThreadId) {
        #[cfg(feature = "dbg-stack-check")]
        {
            let wabase = self.thd(otp).wabase;
            if wabase != 0 && !self.port.stack_check(wabase) {
                self.halt(HaltReason::StackOverflow);
            }
        }
        let nctx = NonNull::from(&mut self.thd_mut(ntp).ctx);
        let octx = NonNull::from(&mut self.thd_mut(otp).ctx);
        unsafe { self.port.switch(nctx, octx) };
    }
}
