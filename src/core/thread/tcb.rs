//! Thread slot definition
//!
//! A thread is identified by its slot in the system table, the slot index is
//! also its priority (0 = highest). The idle thread lives in the extra slot
//! after the application ones.

use core::cell::UnsafeCell;
use core::fmt;
use core::ptr;

use crate::cs_cell::CsCell;
use crate::sync::queue::ThreadsQueue;
use crate::types::{EventMask, Interval, Msg, Prio};

/// Thread entry point, a thread returning from it exits with `MSG_OK`.
pub type ThreadFn = fn(*mut ());

/// Handle to a thread slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThreadId(pub(crate) usize);

impl ThreadId {
    /// Slot index, equal to the thread priority.
    #[inline(always)]
    pub const fn prio(self) -> Prio {
        self.0
    }

    /// Handle of the application slot for priority `prio`.
    #[inline(always)]
    pub const fn from_prio(prio: Prio) -> Self {
        ThreadId(prio)
    }
}

// ============ Thread state ============

/// Lifecycle state of a thread, with the object it waits on.
///
/// A thread is either ready (running or runnable) or in exactly one wait
/// condition, the payload of the wait variants identifies what would wake it.
#[derive(Clone, Copy)]
pub enum ThreadState {
    /// Slot never used
    WtStart,
    /// Ready or running, holds the last wake-up message
    Ready(Msg),
    /// Sleeping for a time interval
    Sleeping,
    /// Suspended on a reference cell
    Suspended(&'static ThreadReference),
    /// Waiting for the termination of another thread
    WtExit(ThreadId),
    /// Waiting on a threads queue (or a semaphore)
    WtQueue(&'static ThreadsQueue),
    /// Waiting for any of the events in the mask
    WtOrEvt(EventMask),
    /// Waiting for all the events in the mask
    WtAndEvt(EventMask),
    /// Terminated, holds the exit message
    Final(Msg),
}

impl ThreadState {
    #[inline(always)]
    pub fn is_ready(&self) -> bool {
        matches!(self, ThreadState::Ready(_))
    }

    #[inline(always)]
    pub fn is_final(&self) -> bool {
        matches!(self, ThreadState::Final(_))
    }

    /// Whether the thread waits on `tqp`.
    #[inline]
    pub fn waits_on(&self, tqp: &ThreadsQueue) -> bool {
        matches!(self, ThreadState::WtQueue(q) if ptr::eq(*q, tqp))
    }

    /// Short state name, for logs and debuggers.
    pub const fn name(&self) -> &'static str {
        match self {
            ThreadState::WtStart => "WTSTART",
            ThreadState::Ready(_) => "READY",
            ThreadState::Sleeping => "SLEEPING",
            ThreadState::Suspended(_) => "SUSPENDED",
            ThreadState::WtExit(_) => "WTEXIT",
            ThreadState::WtQueue(_) => "WTQUEUE",
            ThreadState::WtOrEvt(_) => "WTOREVT",
            ThreadState::WtAndEvt(_) => "WTANDEVT",
            ThreadState::Final(_) => "FINAL",
        }
    }
}

impl PartialEq for ThreadState {
    fn eq(&self, other: &Self) -> bool {
        use ThreadState::*;
        match (self, other) {
            (WtStart, WtStart) | (Sleeping, Sleeping) => true,
            (Ready(a), Ready(b)) | (Final(a), Final(b)) => a == b,
            (Suspended(a), Suspended(b)) => ptr::eq(*a, *b),
            (WtExit(a), WtExit(b)) => a == b,
            (WtQueue(a), WtQueue(b)) => ptr::eq(*a, *b),
            (WtOrEvt(a), WtOrEvt(b)) | (WtAndEvt(a), WtAndEvt(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ThreadState {}

impl fmt::Debug for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadState::Ready(msg) | ThreadState::Final(msg) => {
                write!(f, "{}({})", self.name(), msg)
            }
            ThreadState::Suspended(r) => write!(f, "SUSPENDED({:p})", *r),
            ThreadState::WtExit(tid) => write!(f, "WTEXIT({})", tid.0),
            ThreadState::WtQueue(q) => write!(f, "WTQUEUE({:p})", *q),
            ThreadState::WtOrEvt(m) | ThreadState::WtAndEvt(m) => {
                write!(f, "{}({:#x})", self.name(), m)
            }
            _ => f.write_str(self.name()),
        }
    }
}

// ============ Thread slot ============

/// Thread control block, one per priority slot.
pub struct Thread<C> {
    /// Saved context, owned by the port
    pub(crate) ctx: C,
    pub(crate) state: ThreadState,
    /// Remaining ticks, or delta from the last timer service in timer-delta
    /// mode, 0 when no timeout is armed
    pub(crate) timeout: Interval,
    pub(crate) name: &'static str,
    /// Pending events
    #[cfg(feature = "events")]
    pub(crate) epmask: EventMask,
    /// Lowest usable stack address
    #[cfg(feature = "dbg-stack-check")]
    pub(crate) wabase: usize,
}

impl<C> Thread<C> {
    pub(crate) const fn new(ctx: C) -> Self {
        Self {
            ctx,
            state: ThreadState::WtStart,
            timeout: 0,
            name: "",
            #[cfg(feature = "events")]
            epmask: 0,
            #[cfg(feature = "dbg-stack-check")]
            wabase: 0,
        }
    }

    #[inline(always)]
    pub fn state(&self) -> ThreadState {
        self.state
    }

    #[inline(always)]
    pub fn timeout(&self) -> Interval {
        self.timeout
    }

    #[inline(always)]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Pending events mask
    #[cfg(feature = "events")]
    #[inline(always)]
    pub fn epmask(&self) -> EventMask {
        self.epmask
    }

    /// Saved port context
    #[inline(always)]
    pub fn context(&self) -> &C {
        &self.ctx
    }

    /// Message held by a ready or terminated thread, 0 otherwise.
    #[inline]
    pub(crate) fn msg(&self) -> Msg {
        match self.state {
            ThreadState::Ready(msg) | ThreadState::Final(msg) => msg,
            _ => 0,
        }
    }
}

// ============ Working area ============

/// Statically allocated thread stack.
#[repr(C, align(8))]
pub struct WorkingArea<const SIZE: usize> {
    mem: UnsafeCell<[u8; SIZE]>,
}

// The stack belongs to a single thread once handed to the kernel.
unsafe impl<const SIZE: usize> Sync for WorkingArea<SIZE> {}

impl<const SIZE: usize> WorkingArea<SIZE> {
    pub const fn new() -> Self {
        Self { mem: UnsafeCell::new([0; SIZE]) }
    }

    /// Lowest address of the area.
    #[inline(always)]
    pub const fn base(&self) -> *mut u8 {
        self.mem.get() as *mut u8
    }

    /// One past the highest address of the area.
    #[inline(always)]
    pub const fn end(&self) -> *mut u8 {
        unsafe { self.base().add(SIZE) }
    }

    #[inline(always)]
    pub const fn size(&self) -> usize {
        SIZE
    }
}

impl<const SIZE: usize> Default for WorkingArea<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Thread descriptor ============

/// Everything needed to start a thread.
pub struct ThreadDescriptor {
    pub name: &'static str,
    /// Working area base
    pub wbase: *mut u8,
    /// Working area end
    pub wend: *mut u8,
    /// Priority slot
    pub prio: Prio,
    pub funcp: ThreadFn,
    pub arg: *mut (),
}

// Descriptors are read-only tables pointing into static memory.
unsafe impl Sync for ThreadDescriptor {}

impl ThreadDescriptor {
    /// Descriptor for a thread running `funcp(arg)` on `wa` at priority `prio`.
    pub const fn new<const SIZE: usize>(
        name: &'static str,
        wa: &'static WorkingArea<SIZE>,
        prio: Prio,
        funcp: ThreadFn,
        arg: *mut (),
    ) -> Self {
        Self {
            name,
            wbase: wa.base(),
            wend: wa.end(),
            prio,
            funcp,
            arg,
        }
    }
}

// ============ Thread reference ============

/// Single waiter rendezvous cell used by suspend/resume.
pub struct ThreadReference {
    thread: CsCell<Option<ThreadId>>,
}

impl ThreadReference {
    pub const fn new() -> Self {
        Self { thread: CsCell::new(None) }
    }

    /// Thread currently suspended on the reference.
    #[inline(always)]
    pub fn get(&self) -> Option<ThreadId> {
        self.thread.get()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.get().is_none()
    }

    #[inline(always)]
    pub(crate) fn set(&self, tid: Option<ThreadId>) {
        self.thread.set(tid)
    }

    #[inline(always)]
    pub(crate) fn take(&self) -> Option<ThreadId> {
        self.thread.take()
    }
}

impl Default for ThreadReference {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ThreadReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadReference").field(&self.get()).finish()
    }
}
