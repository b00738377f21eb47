//! Time management module
//!
//! System tick handling in both timer modes, thread sleeping, system time
//! arithmetic and unit conversions.
//!
//! In periodic tick mode every armed timeout is decremented once per tick.
//! In timer-delta mode timeouts are stored relative to `lasttime` and a single
//! alarm is programmed for the nearest deadline.

use crate::config::CFG_ST_FREQUENCY;
use crate::error::kassert;
use crate::kernel::System;
use crate::port::Port;
use crate::thread::{ThreadId, ThreadState};
use crate::types::{Interval, Msg, RtCnt, SysTime, TimeConv, MSG_TIMEOUT};

// ============ Time arithmetic ============

/// Adds an interval to a system time, wrapping.
#[inline(always)]
pub const fn time_add_x(systime: SysTime, interval: Interval) -> SysTime {
    systime.wrapping_add(interval)
}

/// Interval between two system times, wrapping.
#[inline(always)]
pub const fn time_diff_x(start: SysTime, end: SysTime) -> Interval {
    end.wrapping_sub(start)
}

/// Whether `time` lies in `[start, end)`, the window may wrap.
///
/// An empty window (`start == end`) contains nothing.
#[inline(always)]
pub const fn time_is_in_range_x(time: SysTime, start: SysTime, end: SysTime) -> bool {
    time.wrapping_sub(start) < end.wrapping_sub(start)
}

// ============ Unit conversions ============

const FREQ: TimeConv = CFG_ST_FREQUENCY as TimeConv;

/// Seconds to ticks.
#[inline]
pub const fn time_s2i(secs: u32) -> Interval {
    (secs as TimeConv * FREQ) as Interval
}

/// Milliseconds to ticks, rounded up.
#[inline]
pub const fn time_ms2i(msecs: u32) -> Interval {
    ((msecs as TimeConv * FREQ + 999) / 1000) as Interval
}

/// Microseconds to ticks, rounded up.
#[inline]
pub const fn time_us2i(usecs: u32) -> Interval {
    ((usecs as TimeConv * FREQ + 999_999) / 1_000_000) as Interval
}

/// Ticks to seconds, rounded up.
#[inline]
pub const fn time_i2s(interval: Interval) -> u32 {
    ((interval as TimeConv + FREQ - 1) / FREQ) as u32
}

/// Ticks to milliseconds, rounded up.
#[inline]
pub const fn time_i2ms(interval: Interval) -> u32 {
    ((interval as TimeConv * 1000 + FREQ - 1) / FREQ) as u32
}

/// Ticks to microseconds, rounded up.
#[inline]
pub const fn time_i2us(interval: Interval) -> u32 {
    ((interval as TimeConv * 1_000_000 + FREQ - 1) / FREQ) as u32
}

// ============ Realtime counter ============

/// Whether `cnt` lies in `[start, end)`, the window may wrap.
#[inline(always)]
pub const fn sys_is_counter_within_x(cnt: RtCnt, start: RtCnt, end: RtCnt) -> bool {
    cnt.wrapping_sub(start) < end.wrapping_sub(start)
}

impl<P: Port, const N: usize> System<P, N> {
    /// Current realtime counter value.
    #[inline(always)]
    pub fn sys_get_realtime_counter_x(&self) -> RtCnt {
        self.port.rt_counter()
    }

    /// Busy waits for `cycles` realtime counter cycles.
    pub fn sys_polled_delay_x(&self, cycles: RtCnt) {
        let start = self.sys_get_realtime_counter_x();
        let end = start.wrapping_add(cycles);
        while sys_is_counter_within_x(self.sys_get_realtime_counter_x(), start, end) {
            core::hint::spin_loop();
        }
    }

    // ============ System time ============

    /// Current system time.
    #[inline]
    pub fn vt_get_system_time_x(&self) -> SysTime {
        if P::ST_TIMEDELTA == 0 {
            self.systime
        } else {
            self.port.timer_get_time()
        }
    }

    /// Ticks elapsed since `start`.
    #[inline]
    pub fn vt_time_elapsed_since_x(&self, start: SysTime) -> Interval {
        time_diff_x(start, self.vt_get_system_time_x())
    }

    /// Whether the system time lies in `[start, end)`.
    #[inline]
    pub fn vt_is_system_time_within_x(&self, start: SysTime, end: SysTime) -> bool {
        time_is_in_range_x(self.vt_get_system_time_x(), start, end)
    }

    // ============ Tick handling ============

    /// Services the timeouts, called from the system timer ISR, I-class.
    ///
    /// The lock is released and taken again between threads to bound the
    /// interrupt latency.
    pub fn timer_handler_i(&mut self) {
        self.dbg_check_class_i();

        if P::ST_TIMEDELTA == 0 {
            self.systime = self.systime.wrapping_add(1);
            for idx in 0..N {
                let timeout = self.threads[idx].timeout;
                if timeout > 0 {
                    kassert!(self, !self.threads[idx].state.is_ready(), "is ready");
                    self.threads[idx].timeout = timeout - 1;
                    if timeout == 1 {
                        self.expire(ThreadId(idx));
                    }
                }
                self.unlock_from_isr();
                self.lock_from_isr();
            }
        } else {
            kassert!(
                self,
                self.nexttime == self.port.timer_get_alarm(),
                "time mismatch"
            );
            let elapsed = time_diff_x(self.lasttime, self.nexttime);
            let mut next: Interval = 0;
            for idx in 0..N {
                let mut timeout = self.threads[idx].timeout;
                if timeout > 0 {
                    kassert!(self, !self.threads[idx].state.is_ready(), "is ready");
                    kassert!(self, timeout >= elapsed, "skipped one");

                    timeout = timeout.wrapping_sub(elapsed);
                    self.threads[idx].timeout = timeout;
                    if timeout == 0 {
                        self.expire(ThreadId(idx));
                    } else if timeout <= next.wrapping_sub(1) {
                        // Also taken when next == 0.
                        next = timeout;
                    }
                }
                self.unlock_from_isr();
                self.lock_from_isr();
            }

            self.lasttime = self.nexttime;
            if next > 0 {
                self.nexttime = time_add_x(self.nexttime, next);
                self.port.timer_set_alarm(self.nexttime);
            } else {
                self.port.timer_stop_alarm();
            }
        }
    }

    /// Wakes a thread whose timeout ran out, undoing its wait bookkeeping.
    fn expire(&mut self, tid: ThreadId) {
        match self.thd(tid).state {
            ThreadState::WtQueue(tqp) => {
                tqp.cnt_inc();
            }
            ThreadState::Suspended(trp) => trp.set(None),
            _ => {}
        }
        self.ready_i(tid, MSG_TIMEOUT);
    }

    // ============ Sleeping ============

    /// Sleeps for `timeout` ticks, S-class.
    #[inline]
    pub fn thd_sleep_s(&mut self, timeout: Interval) -> Msg {
        self.go_sleep_timeout_s(ThreadState::Sleeping, timeout)
    }

    /// Sleeps until the system time reaches `abstime`, S-class.
    #[inline]
    pub fn thd_sleep_until_s(&mut self, abstime: SysTime) -> Msg {
        let timeout = time_diff_x(self.vt_get_system_time_x(), abstime);
        self.go_sleep_timeout_s(ThreadState::Sleeping, timeout)
    }

    /// Sleeps for `timeout` ticks.
    pub fn thd_sleep(&mut self, timeout: Interval) {
        self.lock();
        self.thd_sleep_s(timeout);
        self.unlock();
    }

    /// Sleeps until the system time reaches `abstime`.
    pub fn thd_sleep_until(&mut self, abstime: SysTime) {
        self.lock();
        self.thd_sleep_until_s(abstime);
        self.unlock();
    }

    #[inline]
    pub fn thd_sleep_seconds(&mut self, secs: u32) {
        self.thd_sleep(time_s2i(secs));
    }

    #[inline]
    pub fn thd_sleep_milliseconds(&mut self, msecs: u32) {
        self.thd_sleep(time_ms2i(msecs));
    }

    #[inline]
    pub fn thd_sleep_microseconds(&mut self, usecs: u32) {
        self.thd_sleep(time_us2i(usecs));
    }
}

/// SysTick interrupt handler
#[cfg(target_arch = "arm")]
#[cortex_m_rt::exception]
fn SysTick() {
    let sys = crate::kernel::sys();
    sys.irq_prologue();
    sys.lock_from_isr();
    sys.timer_handler_i();
    sys.unlock_from_isr();
    sys.irq_epilogue();
}
