//! Kernel lock discipline tracking
//!
//! Two counters describe the static state of the system: the ISR nesting
//! level and the kernel lock counter (0 or 1, the lock does not nest). Every
//! lock related entry point checks them before acting, and the I-class and
//! S-class functions check them on entry.
//!
//! Without the `dbg-state-check` feature all checks collapse to `Ok(())` and
//! the counters are not touched.

use crate::error::{CheckResult, Violation};
use crate::types::Cnt;

/// ISR and lock nesting counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DbgState {
    isr_cnt: Cnt,
    lock_cnt: Cnt,
}

/// Fails with `v` when `bad` holds, a no-op in builds without state checks.
#[inline(always)]
fn fail_if(bad: bool, v: Violation) -> CheckResult {
    if cfg!(feature = "dbg-state-check") && bad {
        Err(v)
    } else {
        Ok(())
    }
}

impl DbgState {
    /// Counters of a system that has not been started yet.
    pub const fn new() -> Self {
        Self { isr_cnt: 0, lock_cnt: 0 }
    }

    /// Current ISR nesting level
    #[inline(always)]
    pub fn isr_cnt(&self) -> Cnt {
        self.isr_cnt
    }

    /// Current kernel lock counter
    #[inline(always)]
    pub fn lock_cnt(&self) -> Cnt {
        self.lock_cnt
    }

    /// Whether the counters say "thread context, kernel locked".
    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        self.lock_cnt > 0
    }

    /// Forces the lock counter, used once by system initialization.
    #[inline(always)]
    pub(crate) fn set_lock_cnt(&mut self, cnt: Cnt) {
        if cfg!(feature = "dbg-state-check") {
            self.lock_cnt = cnt;
        }
    }

    // ============ Thread context transitions ============

    /// Checks performed by `disable()`.
    pub fn check_disable(&self) -> CheckResult {
        fail_if(self.isr_cnt != 0 || self.lock_cnt != 0, Violation::Disable)
    }

    /// Checks performed by `suspend()`.
    pub fn check_suspend(&self) -> CheckResult {
        fail_if(self.isr_cnt != 0 || self.lock_cnt != 0, Violation::Suspend)
    }

    /// Checks performed by `enable()`.
    pub fn check_enable(&self) -> CheckResult {
        fail_if(self.isr_cnt != 0 || self.lock_cnt != 0, Violation::Enable)
    }

    /// Checks performed by `lock()`, then takes the lock.
    pub fn check_lock(&mut self) -> CheckResult {
        fail_if(self.isr_cnt != 0 || self.lock_cnt != 0, Violation::Lock)?;
        self.set_lock_cnt(1);
        Ok(())
    }

    /// Checks performed by `unlock()`, then releases the lock.
    pub fn check_unlock(&mut self) -> CheckResult {
        fail_if(self.isr_cnt != 0 || self.lock_cnt <= 0, Violation::Unlock)?;
        self.set_lock_cnt(0);
        Ok(())
    }

    // ============ ISR context transitions ============

    /// Checks performed by `lock_from_isr()`, then takes the lock.
    pub fn check_lock_from_isr(&mut self) -> CheckResult {
        fail_if(self.isr_cnt <= 0 || self.lock_cnt != 0, Violation::LockFromIsr)?;
        self.set_lock_cnt(1);
        Ok(())
    }

    /// Checks performed by `unlock_from_isr()`, then releases the lock.
    pub fn check_unlock_from_isr(&mut self) -> CheckResult {
        fail_if(self.isr_cnt <= 0 || self.lock_cnt <= 0, Violation::UnlockFromIsr)?;
        self.set_lock_cnt(0);
        Ok(())
    }

    /// Checks performed by the ISR prologue, then enters ISR context.
    pub fn check_enter_isr(&mut self) -> CheckResult {
        fail_if(self.isr_cnt < 0 || self.lock_cnt != 0, Violation::EnterIsr)?;
        if cfg!(feature = "dbg-state-check") {
            self.isr_cnt += 1;
        }
        Ok(())
    }

    /// Checks performed by the ISR epilogue, then leaves ISR context.
    pub fn check_leave_isr(&mut self) -> CheckResult {
        fail_if(self.isr_cnt <= 0 || self.lock_cnt != 0, Violation::LeaveIsr)?;
        if cfg!(feature = "dbg-state-check") {
            self.isr_cnt -= 1;
        }
        Ok(())
    }

    // ============ Function classes ============

    /// I-class functions need the lock, from any context.
    pub fn check_class_i(&self) -> CheckResult {
        fail_if(self.isr_cnt < 0 || self.lock_cnt <= 0, Violation::ClassI)
    }

    /// S-class functions need the lock, from thread context only.
    pub fn check_class_s(&self) -> CheckResult {
        fail_if(self.isr_cnt != 0 || self.lock_cnt <= 0, Violation::ClassS)
    }
}
