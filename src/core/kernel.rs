//! System instance, initialization and lock discipline
//!
//! [`System`] owns the thread table, the scheduling pointers, the time
//! bookkeeping and the debug counters. The scheduler, thread and time
//! operations are implemented on it in their own modules.
//!
//! On ARM targets a single instance lives in a static and is reached through
//! [`sys()`]; host builds create instances freely over the stub port.

use crate::config::CFG_MAX_THREADS;
use crate::critical::DbgState;
use crate::error::{CheckResult, HaltReason};
use crate::port::Port;
use crate::thread::{Thread, ThreadDescriptor, ThreadId, ThreadState};
use crate::types::{SysStatus, SysTime, MSG_OK};
use crate::{error, info};

// ============ System instance ============

/// The kernel, `N` application threads plus the idle thread.
pub struct System<P: Port, const N: usize = CFG_MAX_THREADS> {
    pub(crate) port: P,
    /// Application slots, index = priority
    pub(crate) threads: [Thread<P::Context>; N],
    /// Idle slot, id `N`
    pub(crate) idle: Thread<P::Context>,
    /// Thread holding the CPU
    pub(crate) current: ThreadId,
    /// Highest priority ready thread
    pub(crate) next: ThreadId,
    /// Tick counter (periodic tick mode)
    pub(crate) systime: SysTime,
    /// Last time the timeouts were serviced (timer-delta mode)
    pub(crate) lasttime: SysTime,
    /// Deadline of the programmed alarm (timer-delta mode)
    pub(crate) nexttime: SysTime,
    pub(crate) dbg: DbgState,
    pub(crate) halt_reason: Option<HaltReason>,
}

impl<P: Port, const N: usize> System<P, N> {
    /// Identifier of the idle thread.
    pub const IDLE: ThreadId = ThreadId(N);

    /// Creates a system that has not been started yet.
    pub const fn new(port: P) -> Self {
        Self {
            port,
            threads: [const { Thread::new(P::CONTEXT_INIT) }; N],
            idle: Thread::new(P::CONTEXT_INIT),
            current: ThreadId(N),
            next: ThreadId(N),
            systime: 0,
            lasttime: 0,
            nexttime: 0,
            dbg: DbgState::new(),
            halt_reason: None,
        }
    }

    /// Initializes the kernel and starts the given threads.
    ///
    /// The caller becomes the idle thread: after this returns, it should do
    /// nothing but wait for interrupts.
    pub fn sys_init(&mut self, threads: &[ThreadDescriptor]) {
        self.port.init();
        self.port.system_init_hook();

        // Idle is the current thread until the first reschedule.
        self.current = Self::IDLE;
        self.next = Self::IDLE;
        self.idle.state = ThreadState::Ready(MSG_OK);
        self.idle.name = "idle";

        // Partially enabled interrupts, same as being in the kernel lock.
        self.suspend();
        self.dbg.set_lock_cnt(1);

        for tdp in threads {
            self.thd_create_i(tdp);
        }
        info!("nil: started with {} threads", threads.len());

        self.reschedule_s();
        self.unlock();
    }

    /// Stops the system, never returns.
    ///
    /// Interrupts are disabled, the reason is stored for debuggers and the
    /// port halt hook runs before the final spin.
    pub fn halt(&mut self, reason: HaltReason) -> ! {
        self.port.disable();
        self.halt_reason = Some(reason);
        error!("nil: halted, {}", reason);
        self.port.halt_hook(reason);
        loop {
            core::hint::spin_loop();
        }
    }

    /// Forwards a failed state check to [`System::halt`].
    #[inline(always)]
    pub(crate) fn state_check(&mut self, res: CheckResult) {
        if let Err(v) = res {
            self.halt(v.into());
        }
    }

    // ============ Lock entry points ============

    /// Enters the kernel lock from thread context.
    #[inline]
    pub fn lock(&mut self) {
        self.port.lock();
        let res = self.dbg.check_lock();
        self.state_check(res);
    }

    /// Leaves the kernel lock from thread context.
    #[inline]
    pub fn unlock(&mut self) {
        let res = self.dbg.check_unlock();
        self.state_check(res);
        self.port.unlock();
    }

    /// Enters the kernel lock from an ISR.
    #[inline]
    pub fn lock_from_isr(&mut self) {
        self.port.lock_from_isr();
        let res = self.dbg.check_lock_from_isr();
        self.state_check(res);
    }

    /// Leaves the kernel lock from an ISR.
    #[inline]
    pub fn unlock_from_isr(&mut self) {
        let res = self.dbg.check_unlock_from_isr();
        self.state_check(res);
        self.port.unlock_from_isr();
    }

    /// Disables all interrupts, thread context only.
    pub fn disable(&mut self) {
        self.port.disable();
        let res = self.dbg.check_disable();
        self.state_check(res);
    }

    /// Masks the kernel-level interrupts, thread context only.
    pub fn suspend(&mut self) {
        self.port.suspend();
        let res = self.dbg.check_suspend();
        self.state_check(res);
    }

    /// Enables all interrupts, thread context only.
    pub fn enable(&mut self) {
        let res = self.dbg.check_enable();
        self.state_check(res);
        self.port.enable();
    }

    /// Must open every interrupt handler that uses kernel services.
    #[inline]
    pub fn irq_prologue(&mut self) {
        let res = self.dbg.check_enter_isr();
        self.state_check(res);
    }

    /// Must close every interrupt handler that uses kernel services.
    ///
    /// When a higher priority thread became ready during the ISR the port is
    /// asked to preempt the interrupted thread on return.
    pub fn irq_epilogue(&mut self) {
        let res = self.dbg.check_leave_isr();
        self.state_check(res);
        self.port.lock_from_isr();
        if self.is_preemption_required() && self.port.request_preemption() {
            // The lock is released by switch_from_isr().
            return;
        }
        self.port.unlock_from_isr();
    }

    /// Thread-context tail of a preemption requested by an ISR epilogue.
    ///
    /// Entered with the port locked, switches to the higher priority thread
    /// and releases the lock when the preempted thread resumes.
    pub fn switch_from_isr(&mut self) {
        let res = self.dbg.check_lock();
        self.state_check(res);
        self.do_preemption();
        let res = self.dbg.check_unlock();
        self.state_check(res);
        self.port.exit_from_isr();
    }

    /// Locks the kernel from any context, returning the previous status.
    pub fn get_status_and_lock_x(&mut self) -> SysStatus {
        let sts = self.port.get_irq_status();
        if self.port.irq_enabled(sts) {
            if self.port.is_isr_context() {
                self.lock_from_isr();
            } else {
                self.lock();
            }
        }
        sts
    }

    /// Restores the status returned by [`System::get_status_and_lock_x`].
    pub fn restore_status_x(&mut self, sts: SysStatus) {
        if self.port.irq_enabled(sts) {
            if self.port.is_isr_context() {
                self.unlock_from_isr();
            } else {
                self.reschedule_s();
                self.unlock();
            }
        }
    }

    /// Locks the kernel only if it is not already locked.
    pub fn unconditional_lock(&mut self) {
        let sts = self.port.get_irq_status();
        if self.port.irq_enabled(sts) {
            self.lock();
        }
    }

    /// Unlocks the kernel only if it is locked.
    pub fn unconditional_unlock(&mut self) {
        let sts = self.port.get_irq_status();
        if !self.port.irq_enabled(sts) {
            self.unlock();
        }
    }

    /// Halts unless called as an I-class function.
    #[inline(always)]
    pub fn dbg_check_class_i(&mut self) {
        let res = self.dbg.check_class_i();
        self.state_check(res);
    }

    /// Halts unless called as an S-class function.
    #[inline(always)]
    pub fn dbg_check_class_s(&mut self) {
        let res = self.dbg.check_class_s();
        self.state_check(res);
    }

    // ============ Accessors ============

    #[inline(always)]
    pub(crate) fn thd(&self, tid: ThreadId) -> &Thread<P::Context> {
        if tid.0 < N {
            &self.threads[tid.0]
        } else {
            &self.idle
        }
    }

    #[inline(always)]
    pub(crate) fn thd_mut(&mut self, tid: ThreadId) -> &mut Thread<P::Context> {
        if tid.0 < N {
            &mut self.threads[tid.0]
        } else {
            &mut self.idle
        }
    }

    /// Thread slot for `tid`, the idle thread for `System::IDLE`.
    #[inline]
    pub fn thread(&self, tid: ThreadId) -> &Thread<P::Context> {
        self.thd(tid)
    }

    /// State of the thread `tid`.
    #[inline]
    pub fn state(&self, tid: ThreadId) -> ThreadState {
        self.thd(tid).state
    }

    /// Thread holding the CPU.
    #[inline(always)]
    pub fn current(&self) -> ThreadId {
        self.current
    }

    /// Highest priority ready thread.
    #[inline(always)]
    pub fn next(&self) -> ThreadId {
        self.next
    }

    #[inline(always)]
    pub fn port(&self) -> &P {
        &self.port
    }

    #[inline(always)]
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Lock and ISR counters.
    #[inline(always)]
    pub fn dbg_state(&self) -> &DbgState {
        &self.dbg
    }

    /// Reason of the halt, if the system halted.
    #[inline(always)]
    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.halt_reason
    }
}

// ============ Global instance (ARM) ============

#[cfg(target_arch = "arm")]
mod global {
    use portable_atomic::{AtomicBool, Ordering};

    use super::System;
    use crate::cs_cell::CsCell;
    use crate::port::CortexM4;
    use crate::thread::ThreadDescriptor;

    static NIL: CsCell<System<CortexM4>> = CsCell::new(System::new(CortexM4::new()));

    static STARTED: AtomicBool = AtomicBool::new(false);

    /// The system instance.
    ///
    /// Single core: every kernel method enforces its own lock discipline,
    /// callers must respect the function classes.
    #[inline(always)]
    pub fn sys() -> &'static mut System<CortexM4> {
        unsafe { NIL.get_unchecked() }
    }

    /// Whether [`start`] has run.
    #[inline(always)]
    pub fn is_started() -> bool {
        STARTED.load(Ordering::Acquire)
    }

    /// Starts the kernel and turns the caller into the idle thread.
    pub fn start(threads: &[ThreadDescriptor]) -> ! {
        if STARTED.swap(true, Ordering::AcqRel) {
            sys().halt(crate::error::HaltReason::Assert("already started"));
        }
        sys().sys_init(threads);
        loop {
            cortex_m::asm::wfi();
        }
    }
}

#[cfg(target_arch = "arm")]
pub use global::{is_started, start, sys};
