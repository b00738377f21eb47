//! Semaphore implementation
//!
//! Counting semaphores built on a threads queue: a positive counter holds the
//! available units, a negative one the number of waiters.

use core::fmt;

use crate::error::{kassert, kcheck};
use crate::kernel::System;
use crate::port::Port;
use crate::sync::queue::ThreadsQueue;
use crate::thread::ThreadState;
use crate::types::{Cnt, Interval, Msg, MSG_OK, MSG_RESET, MSG_TIMEOUT, TIME_IMMEDIATE, TIME_INFINITE};

/// Counting semaphore
#[repr(transparent)]
pub struct Semaphore {
    queue: ThreadsQueue,
}

impl Semaphore {
    /// Create a new semaphore with `n` available units
    pub const fn new(n: Cnt) -> Self {
        Self {
            queue: ThreadsQueue::with_count(n),
        }
    }

    /// Underlying threads queue, waiters sleep in `WtQueue` on it.
    #[inline(always)]
    pub fn queue(&self) -> &ThreadsQueue {
        &self.queue
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore").field("cnt", &self.queue.count()).finish()
    }
}

impl<P: Port, const N: usize> System<P, N> {
    /// Takes a unit from `sp`, waiting up to `timeout`, S-class.
    ///
    /// Returns `MSG_OK`, `MSG_TIMEOUT`, or `MSG_RESET` if the semaphore was
    /// reset while waiting.
    pub fn sem_wait_timeout_s(&mut self, sp: &'static Semaphore, timeout: Interval) -> Msg {
        self.dbg_check_class_s();

        let cnt = sp.queue.count();
        if cnt > 0 {
            sp.queue.set_count(cnt - 1);
            return MSG_OK;
        }
        if timeout == TIME_IMMEDIATE {
            return MSG_TIMEOUT;
        }
        sp.queue.set_count(cnt - 1);
        self.go_sleep_timeout_s(ThreadState::WtQueue(&sp.queue), timeout)
    }

    /// Takes a unit from `sp`, waiting up to `timeout`.
    pub fn sem_wait_timeout(&mut self, sp: &'static Semaphore, timeout: Interval) -> Msg {
        self.lock();
        let msg = self.sem_wait_timeout_s(sp, timeout);
        self.unlock();
        msg
    }

    /// Takes a unit from `sp`, S-class.
    #[inline]
    pub fn sem_wait_s(&mut self, sp: &'static Semaphore) -> Msg {
        self.sem_wait_timeout_s(sp, TIME_INFINITE)
    }

    /// Takes a unit from `sp`.
    #[inline]
    pub fn sem_wait(&mut self, sp: &'static Semaphore) -> Msg {
        self.sem_wait_timeout(sp, TIME_INFINITE)
    }

    /// Returns a unit to `sp`, waking the highest priority waiter, I-class.
    pub fn sem_signal_i(&mut self, sp: &Semaphore) {
        self.dbg_check_class_i();
        if sp.queue.cnt_inc() <= 0 {
            let waiter = self.find_thread(|st| st.waits_on(&sp.queue));
            kassert!(self, waiter.is_some(), "not waiting");
            if let Some(tid) = waiter {
                self.ready_i(tid, MSG_OK);
            }
        }
    }

    /// Returns a unit to `sp` and reschedules.
    pub fn sem_signal(&mut self, sp: &Semaphore) {
        self.lock();
        self.sem_signal_i(sp);
        self.reschedule_s();
        self.unlock();
    }

    /// Sets the counter of `sp` to `n`, waiters get `MSG_RESET`, I-class.
    pub fn sem_reset_i(&mut self, sp: &Semaphore, n: Cnt) {
        self.dbg_check_class_i();
        kcheck!(self, n >= 0, "invalid counter");

        let cnt = sp.queue.count();
        sp.queue.set_count(n);
        self.ready_all(&sp.queue, cnt, MSG_RESET);
    }

    /// Sets the counter of `sp` to `n` and reschedules.
    pub fn sem_reset(&mut self, sp: &Semaphore, n: Cnt) {
        self.lock();
        self.sem_reset_i(sp, n);
        self.reschedule_s();
        self.unlock();
    }

    /// Counter of `sp`, I-class.
    #[inline]
    pub fn sem_get_counter_i(&mut self, sp: &Semaphore) -> Cnt {
        self.dbg_check_class_i();
        sp.queue.count()
    }
}
