//! Threads queues
//!
//! A threads queue is just a signed counter: `-cnt` threads are waiting on
//! it. Waiters are not linked anywhere, they are found by scanning the thread
//! table for `WtQueue` states pointing at the queue, so the highest priority
//! waiter is always served first.

use core::fmt;

use crate::cs_cell::CsCell;
use crate::error::kassert;
use crate::kernel::System;
use crate::port::Port;
use crate::thread::ThreadState;
use crate::types::{Cnt, Interval, Msg, MSG_TIMEOUT, TIME_IMMEDIATE};

/// Queue of threads waiting for a condition.
pub struct ThreadsQueue {
    cnt: CsCell<Cnt>,
}

impl ThreadsQueue {
    /// An empty queue.
    pub const fn new() -> Self {
        Self::with_count(0)
    }

    /// A queue whose counter starts at `cnt`, used by counting objects.
    pub(crate) const fn with_count(cnt: Cnt) -> Self {
        Self { cnt: CsCell::new(cnt) }
    }

    /// Raw counter, negative values count the waiters.
    #[inline(always)]
    pub fn count(&self) -> Cnt {
        self.cnt.get()
    }

    #[inline(always)]
    pub(crate) fn set_count(&self, cnt: Cnt) {
        self.cnt.set(cnt)
    }

    #[inline(always)]
    pub(crate) fn cnt_inc(&self) -> Cnt {
        self.cnt.with(|c| {
            *c += 1;
            *c
        })
    }

    #[inline(always)]
    pub(crate) fn cnt_dec(&self) -> Cnt {
        self.cnt.with(|c| {
            *c -= 1;
            *c
        })
    }
}

impl Default for ThreadsQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ThreadsQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadsQueue").field("cnt", &self.count()).finish()
    }
}

impl<P: Port, const N: usize> System<P, N> {
    /// Enqueues the current thread on `tqp`, S-class.
    ///
    /// Returns the message passed by the dequeuer, or `MSG_TIMEOUT`. With
    /// `TIME_IMMEDIATE` the call fails at once without touching the queue.
    pub fn thd_enqueue_timeout_s(&mut self, tqp: &'static ThreadsQueue, timeout: Interval) -> Msg {
        self.dbg_check_class_s();
        kassert!(self, tqp.count() <= 0, "invalid counter");

        if timeout == TIME_IMMEDIATE {
            return MSG_TIMEOUT;
        }

        tqp.cnt_dec();
        self.go_sleep_timeout_s(ThreadState::WtQueue(tqp), timeout)
    }

    /// Wakes the highest priority waiter, the queue must not be empty.
    pub fn thd_do_dequeue_next_i(&mut self, tqp: &ThreadsQueue, msg: Msg) {
        kassert!(self, tqp.count() < 0, "empty queue");

        tqp.cnt_inc();
        match self.find_thread(|st| st.waits_on(tqp)) {
            Some(tid) => {
                self.ready_i(tid, msg);
            }
            None => {
                kassert!(self, false, "thread not found");
            }
        }
    }

    /// Wakes the highest priority waiter, if any, I-class.
    pub fn thd_dequeue_next_i(&mut self, tqp: &ThreadsQueue, msg: Msg) {
        self.dbg_check_class_i();
        if tqp.count() < 0 {
            self.thd_do_dequeue_next_i(tqp, msg);
        }
    }

    /// Wakes every waiter, I-class. Returns the number of woken threads.
    pub fn thd_dequeue_all_i(&mut self, tqp: &ThreadsQueue, msg: Msg) -> Cnt {
        self.dbg_check_class_i();
        let cnt = tqp.count();
        if cnt >= 0 {
            return 0;
        }
        let left = self.ready_all(tqp, cnt, msg);
        tqp.set_count(left);
        left - cnt
    }

    /// Whether nobody waits on `tqp`, I-class.
    #[inline]
    pub fn thd_queue_is_empty_i(&mut self, tqp: &ThreadsQueue) -> bool {
        self.dbg_check_class_i();
        tqp.count() >= 0
    }
}
