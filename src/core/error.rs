//! Error types for the Nil kernel
//!
//! The kernel has no recoverable error paths: a broken call contract is a
//! programming error and ends in [`crate::kernel::System::halt`]. The types
//! here make the reason of a halt machine readable, internal checks return
//! `Result<(), Violation>` and the caller forwards any `Err` to the halt.

use core::fmt;

/// System state rule broken by a caller.
///
/// Each variant maps to a distinct `SV#n` tag so that a debugger or a log can
/// tell exactly which rule was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Violation {
    /// `disable()` called from ISR context or while locked
    Disable = 1,
    /// `suspend()` called from ISR context or while locked
    Suspend = 2,
    /// `enable()` called from ISR context or while locked
    Enable = 3,
    /// `lock()` called from ISR context or while already locked
    Lock = 4,
    /// `unlock()` called from ISR context or while not locked
    Unlock = 5,
    /// `lock_from_isr()` called outside ISR context or while locked
    LockFromIsr = 6,
    /// `unlock_from_isr()` called outside ISR context or while not locked
    UnlockFromIsr = 7,
    /// ISR prologue entered while locked
    EnterIsr = 8,
    /// ISR epilogue without a matching prologue, or while locked
    LeaveIsr = 9,
    /// I-class function called without the kernel lock
    ClassI = 10,
    /// S-class function called from ISR context or without the kernel lock
    ClassS = 11,
}

impl Violation {
    /// The short tag identifying the violated rule.
    pub const fn tag(self) -> &'static str {
        match self {
            Violation::Disable => "SV#1",
            Violation::Suspend => "SV#2",
            Violation::Enable => "SV#3",
            Violation::Lock => "SV#4",
            Violation::Unlock => "SV#5",
            Violation::LockFromIsr => "SV#6",
            Violation::UnlockFromIsr => "SV#7",
            Violation::EnterIsr => "SV#8",
            Violation::LeaveIsr => "SV#9",
            Violation::ClassI => "SV#10",
            Violation::ClassS => "SV#11",
        }
    }

    /// Numeric code of the rule, `n` in `SV#n`.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Why the system halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HaltReason {
    /// Lock/ISR discipline broken
    State(Violation),
    /// Kernel invariant assertion failed
    Assert(&'static str),
    /// Parameter check failed
    Check(&'static str),
    /// Outgoing thread overran its working area
    StackOverflow,
    /// Unrecoverable CPU fault
    Fault,
}

impl HaltReason {
    /// Short message describing the halt, e.g. `"SV#4"` or `"already ready"`.
    pub const fn message(&self) -> &'static str {
        match self {
            HaltReason::State(v) => v.tag(),
            HaltReason::Assert(msg) | HaltReason::Check(msg) => msg,
            HaltReason::StackOverflow => "stack overflow",
            HaltReason::Fault => "fault",
        }
    }
}

impl From<Violation> for HaltReason {
    fn from(v: Violation) -> Self {
        HaltReason::State(v)
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Result of an internal state check
pub type CheckResult = Result<(), Violation>;

/// Kernel invariant assertion, halts with `reason` when `cond` is false.
///
/// Compiled out unless the `dbg-asserts` feature is enabled.
macro_rules! kassert {
    ($sys:expr, $cond:expr, $reason:expr) => {
        if cfg!(feature = "dbg-asserts") && !($cond) {
            $sys.halt($crate::error::HaltReason::Assert($reason));
        }
    };
}

/// Parameter check, halts with `reason` when `cond` is false.
///
/// Compiled out unless the `dbg-checks` feature is enabled.
macro_rules! kcheck {
    ($sys:expr, $cond:expr, $reason:expr) => {
        if cfg!(feature = "dbg-checks") && !($cond) {
            $sys.halt($crate::error::HaltReason::Check($reason));
        }
    };
}

pub(crate) use kassert;
pub(crate) use kcheck;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_tags() {
        assert_eq!(Violation::Disable.tag(), "SV#1");
        assert_eq!(Violation::Lock.tag(), "SV#4");
        assert_eq!(Violation::ClassS.tag(), "SV#11");
        assert_eq!(Violation::ClassI.code(), 10);
    }

    #[test]
    fn test_halt_reason_message() {
        assert_eq!(HaltReason::from(Violation::Unlock).message(), "SV#5");
        assert_eq!(HaltReason::Assert("already ready").message(), "already ready");
        assert_eq!(HaltReason::StackOverflow.message(), "stack overflow");
    }
}
