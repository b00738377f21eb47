//! Port layer - CPU-specific implementations
//!
//! The scheduler never touches CPU registers itself. Everything that is
//! architecture dependent (interrupt masking, initial stack frames, the
//! register level context switch, the system timer) sits behind [`Port`].

use core::ptr::NonNull;

use crate::config::CFG_ST_TIMEDELTA;
use crate::error::HaltReason;
use crate::thread::{ThreadFn, ThreadId};
use crate::types::{Interval, RtCnt, SysStatus, SysTime};

#[cfg(target_arch = "arm")]
pub mod cortex_m4;

#[cfg(target_arch = "arm")]
pub use cortex_m4::CortexM4;

// Host implementation, used by the test suite
#[cfg(not(target_arch = "arm"))]
pub mod stub;

/// Architecture contract required by the scheduler.
///
/// Lock methods operate on the hardware only, the lock discipline counters
/// are kept by [`crate::kernel::System`]. Timer methods are only called in
/// timer-delta mode (`ST_TIMEDELTA > 0`), hooks default to no-ops.
pub trait Port {
    /// Saved register context of a thread, owned by the port.
    type Context;

    /// Value of a context that has never been set up.
    const CONTEXT_INIT: Self::Context;

    /// Timer-delta guard band in ticks, 0 selects the periodic tick mode.
    ///
    /// Timeouts shorter than this are stretched so that the alarm can be
    /// programmed before the free running counter passes it.
    const ST_TIMEDELTA: Interval = CFG_ST_TIMEDELTA;

    /// Required alignment of a working area base.
    const WORKING_AREA_ALIGN: usize = 8;

    /// Required alignment of a stack pointer.
    const STACK_ALIGN: usize = 8;

    /// Low level initialization, runs first in `sys_init()`.
    fn init(&mut self) {}

    // ============ Interrupt masking ============

    /// Enters the kernel critical zone from thread context.
    fn lock(&mut self);

    /// Leaves the kernel critical zone from thread context.
    fn unlock(&mut self);

    /// Enters the kernel critical zone from ISR context.
    fn lock_from_isr(&mut self) {
        self.lock()
    }

    /// Leaves the kernel critical zone from ISR context.
    fn unlock_from_isr(&mut self) {
        self.unlock()
    }

    /// Disables all interrupt sources.
    fn disable(&mut self);

    /// Disables the interrupt sources below the kernel level.
    fn suspend(&mut self);

    /// Enables all interrupt sources.
    fn enable(&mut self);

    /// Opaque snapshot of the interrupt mask.
    fn get_irq_status(&self) -> SysStatus;

    /// Whether `sts` says that interrupts were enabled.
    fn irq_enabled(&self, sts: SysStatus) -> bool;

    /// Whether the CPU is currently serving an interrupt.
    fn is_isr_context(&self) -> bool;

    // ============ Context switching ============

    /// Builds the initial frame of a thread so that the first switch into
    /// `ctx` starts executing `f(arg)`.
    ///
    /// # Safety
    /// `wbase..wend` must be a working area owned by the thread, unused by
    /// anybody else for the thread's whole life.
    unsafe fn setup_context(
        &mut self,
        ctx: &mut Self::Context,
        wbase: *mut u8,
        wend: *mut u8,
        f: ThreadFn,
        arg: *mut (),
    );

    /// Saves the running context into `otp` and resumes `ntp`.
    ///
    /// Called with the kernel locked. On hardware the call returns only when
    /// `otp` is switched in again.
    ///
    /// # Safety
    /// Both pointers refer to contexts inside the system thread table and
    /// `ntp` holds a valid saved or freshly set up context.
    unsafe fn switch(&mut self, ntp: NonNull<Self::Context>, otp: NonNull<Self::Context>);

    /// Arranges a preemption on return from the outermost ISR.
    ///
    /// Called by the ISR epilogue with the port locked. Returning `true`
    /// means the port keeps the lock and will call
    /// [`crate::kernel::System::switch_from_isr`] in thread context.
    fn request_preemption(&mut self) -> bool;

    /// Releases the lock kept across a preemption from ISR.
    fn exit_from_isr(&mut self) {
        self.unlock_from_isr()
    }

    /// Whether the running stack still has room above `wabase`.
    fn stack_check(&self, _wabase: usize) -> bool {
        true
    }

    // ============ System timer (timer-delta mode) ============

    /// Free running system timer counter.
    fn timer_get_time(&self) -> SysTime {
        0
    }

    /// Starts the alarm unit with a first deadline.
    fn timer_start_alarm(&mut self, _time: SysTime) {}

    /// Reprograms the pending alarm.
    fn timer_set_alarm(&mut self, _time: SysTime) {}

    /// Stops the alarm unit.
    fn timer_stop_alarm(&mut self) {}

    /// Deadline of the pending alarm.
    fn timer_get_alarm(&self) -> SysTime {
        0
    }

    /// Realtime counter, counts CPU cycles.
    fn rt_counter(&self) -> RtCnt {
        0
    }

    // ============ Hooks ============

    /// Runs during `sys_init()` after the port initialization.
    fn system_init_hook(&mut self) {}

    /// Runs when a thread slot is set up.
    fn thread_init_hook(&mut self, _tid: ThreadId) {}

    /// Runs when a thread exits.
    fn thread_exit_hook(&mut self, _tid: ThreadId) {}

    /// Runs when the scheduler selects the idle thread.
    fn idle_enter_hook(&mut self) {}

    /// Runs when the idle thread is preempted.
    fn idle_leave_hook(&mut self) {}

    /// Runs once the system is halted, with interrupts disabled.
    fn halt_hook(&mut self, _reason: HaltReason) {}
}
