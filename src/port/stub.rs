//! Host port
//!
//! There are no real threads on the host: `switch` only records the handoff
//! and returns, so a blocking call returns as if executed by the thread that
//! has just been switched in. Every interaction with the "hardware" is
//! recorded so that tests can check what the scheduler asked for.

use core::ptr::NonNull;

use portable_atomic::{AtomicU32, Ordering};

use super::Port;
use crate::error::HaltReason;
use crate::thread::{ThreadFn, ThreadId};
use crate::types::{Interval, RtCnt, SysStatus, SysTime};

/// Fake saved context, remembers what the thread would run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubContext {
    pub entry: usize,
    pub arg: usize,
    pub wbase: usize,
    pub wend: usize,
}

/// Host port, `TIMEDELTA` selects the timer mode.
#[derive(Debug)]
pub struct StubPort<const TIMEDELTA: Interval = 0> {
    irq_enabled: bool,
    isr: bool,
    /// Number of context switches performed
    pub switches: usize,
    /// Number of preemptions requested by ISR epilogues
    pub preemption_requests: usize,
    preemption_pending: bool,
    /// Idle hook counters
    pub idle_enter: usize,
    pub idle_leave: usize,
    /// Threads reported by the exit hook, in order
    pub exited: [Option<ThreadId>; 8],
    exited_len: usize,
    now: SysTime,
    alarm: Option<SysTime>,
    /// Number of times the alarm unit was (re)programmed
    pub alarm_writes: usize,
    /// Forces the next stack check to fail
    pub stack_overflow: bool,
    cycles: AtomicU32,
}

impl<const TIMEDELTA: Interval> StubPort<TIMEDELTA> {
    pub const fn new() -> Self {
        Self {
            irq_enabled: true,
            isr: false,
            switches: 0,
            preemption_requests: 0,
            preemption_pending: false,
            idle_enter: 0,
            idle_leave: 0,
            exited: [None; 8],
            exited_len: 0,
            now: 0,
            alarm: None,
            alarm_writes: 0,
            stack_overflow: false,
            cycles: AtomicU32::new(0),
        }
    }

    /// Whether interrupts are currently enabled.
    pub fn irqs_on(&self) -> bool {
        self.irq_enabled
    }

    /// Marks the CPU as serving (or not) an interrupt.
    pub fn set_isr(&mut self, isr: bool) {
        self.isr = isr;
    }

    /// Whether an ISR epilogue left a preemption to be performed.
    pub fn preemption_pending(&self) -> bool {
        self.preemption_pending
    }

    /// Free running timer value.
    pub fn now(&self) -> SysTime {
        self.now
    }

    /// Moves the free running timer forward.
    pub fn advance(&mut self, ticks: Interval) {
        self.now = self.now.wrapping_add(ticks);
    }

    /// Pending alarm deadline, `None` when the alarm unit is stopped.
    pub fn alarm(&self) -> Option<SysTime> {
        self.alarm
    }

    /// Threads that went through the exit hook.
    pub fn exited(&self) -> &[Option<ThreadId>] {
        &self.exited[..self.exited_len]
    }
}

impl<const TIMEDELTA: Interval> Default for StubPort<TIMEDELTA> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const TIMEDELTA: Interval> Port for StubPort<TIMEDELTA> {
    type Context = StubContext;

    const CONTEXT_INIT: StubContext = StubContext {
        entry: 0,
        arg: 0,
        wbase: 0,
        wend: 0,
    };

    const ST_TIMEDELTA: Interval = TIMEDELTA;

    fn lock(&mut self) {
        self.irq_enabled = false;
    }

    fn unlock(&mut self) {
        self.irq_enabled = true;
    }

    fn disable(&mut self) {
        self.irq_enabled = false;
    }

    fn suspend(&mut self) {
        self.irq_enabled = false;
    }

    fn enable(&mut self) {
        self.irq_enabled = true;
    }

    fn get_irq_status(&self) -> SysStatus {
        SysStatus(self.irq_enabled as u32)
    }

    fn irq_enabled(&self, sts: SysStatus) -> bool {
        sts.0 != 0
    }

    fn is_isr_context(&self) -> bool {
        self.isr
    }

    unsafe fn setup_context(
        &mut self,
        ctx: &mut StubContext,
        wbase: *mut u8,
        wend: *mut u8,
        f: ThreadFn,
        arg: *mut (),
    ) {
        *ctx = StubContext {
            entry: f as usize,
            arg: arg as usize,
            wbase: wbase as usize,
            wend: wend as usize,
        };
    }

    unsafe fn switch(&mut self, _ntp: NonNull<StubContext>, _otp: NonNull<StubContext>) {
        self.switches += 1;
    }

    fn request_preemption(&mut self) -> bool {
        self.preemption_requests += 1;
        self.preemption_pending = true;
        true
    }

    fn exit_from_isr(&mut self) {
        self.preemption_pending = false;
        self.irq_enabled = true;
    }

    fn stack_check(&self, _wabase: usize) -> bool {
        !self.stack_overflow
    }

    fn timer_get_time(&self) -> SysTime {
        self.now
    }

    fn timer_start_alarm(&mut self, time: SysTime) {
        self.alarm = Some(time);
        self.alarm_writes += 1;
    }

    fn timer_set_alarm(&mut self, time: SysTime) {
        self.alarm = Some(time);
        self.alarm_writes += 1;
    }

    fn timer_stop_alarm(&mut self) {
        self.alarm = None;
    }

    fn timer_get_alarm(&self) -> SysTime {
        self.alarm.unwrap_or(self.now)
    }

    fn rt_counter(&self) -> RtCnt {
        // Every read moves the counter, so polled delays terminate.
        self.cycles.fetch_add(1, Ordering::Relaxed)
    }

    fn thread_exit_hook(&mut self, tid: ThreadId) {
        if self.exited_len < self.exited.len() {
            self.exited[self.exited_len] = Some(tid);
            self.exited_len += 1;
        }
    }

    fn idle_enter_hook(&mut self) {
        self.idle_enter += 1;
    }

    fn idle_leave_hook(&mut self) {
        self.idle_leave += 1;
    }

    fn halt_hook(&mut self, reason: HaltReason) {
        panic!("system halted: {}", reason);
    }
}
