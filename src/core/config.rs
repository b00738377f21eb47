//! Compile-time configuration for the Nil kernel
//!
//! These constants control the resource limits and the time base. Code paths
//! that can be left out entirely are selected with cargo features instead
//! (`waitexit`, `semaphores`, `events`, `dbg-*`).

use crate::types::Interval;

/// Number of application thread slots, the idle thread takes one extra slot
pub const CFG_MAX_THREADS: usize = 8;

/// System tick frequency in Hz
pub const CFG_ST_FREQUENCY: u32 = 1000;

/// Default timer-delta guard band, 0 selects the periodic tick mode.
///
/// Ports override this through [`crate::port::Port::ST_TIMEDELTA`] because
/// the minimum safe alarm distance depends on the timer hardware.
pub const CFG_ST_TIMEDELTA: Interval = 0;

/// System time resolution in bits
#[cfg(not(feature = "st-resolution-16"))]
pub const CFG_ST_RESOLUTION: u32 = 32;

/// System time resolution in bits
#[cfg(feature = "st-resolution-16")]
pub const CFG_ST_RESOLUTION: u32 = 16;

/// Core clock feeding SysTick in Hz (ARM port), STM32F4 reset clock
pub const CFG_CORE_CLOCK: u32 = 16_000_000;

/// Interrupt (main) stack size in bytes (ARM port)
pub const CFG_INT_STACK_SIZE: usize = 1024;
