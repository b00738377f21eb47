//! Core type definitions for the Nil kernel
//!
//! Scalar aliases shared by the scheduler, the port layer and the
//! synchronization objects, plus the special message and time values.

/// Thread priority slot (0 = highest priority)
pub type Prio = usize;

/// Signed counter, used by thread queues and the debug state counters
pub type Cnt = i32;

/// Wake-up or exit message
pub type Msg = i32;

/// System time, free running and wrapping
#[cfg(not(feature = "st-resolution-16"))]
pub type SysTime = u32;

/// System time, free running and wrapping
#[cfg(feature = "st-resolution-16")]
pub type SysTime = u16;

/// Time interval in system ticks
pub type Interval = SysTime;

/// Intermediate type for time unit conversions
pub type TimeConv = u64;

/// Realtime counter value (CPU cycles)
pub type RtCnt = u32;

/// Event mask, one bit per event id
pub type EventMask = u32;

/// Event flags carried by an event source
pub type EventFlags = u32;

/// Event identifier (bit index into an [`EventMask`])
pub type EventId = u32;

// ============ Messages ============

/// Normal wake-up message.
pub const MSG_OK: Msg = 0;

/// Wake-up caused by a timeout condition.
pub const MSG_TIMEOUT: Msg = -1;

/// Wake-up caused by a reset condition.
pub const MSG_RESET: Msg = -2;

// ============ Special time values ============

/// Special value, the operation fails immediately instead of blocking.
pub const TIME_IMMEDIATE: Interval = Interval::MAX;

/// Infinite interval, no timeout is armed.
pub const TIME_INFINITE: Interval = 0;

/// Maximum interval usable as a timeout.
pub const TIME_MAX_INTERVAL: Interval = Interval::MAX - 1;

/// Maximum system time value.
pub const TIME_MAX_SYSTIME: SysTime = SysTime::MAX;

// ============ Events ============

/// Mask selecting every event.
pub const ALL_EVENTS: EventMask = EventMask::MAX;

/// Mask with only the bit of `eid` set.
#[inline(always)]
pub const fn event_mask(eid: EventId) -> EventMask {
    1 << eid
}

/// Opaque interrupt status word returned by the port layer.
///
/// The encoding is architecture dependent, only [`crate::port::Port::irq_enabled`]
/// knows how to interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SysStatus(pub u32);
