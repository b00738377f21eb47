//! Nil RTOS kernel in Rust
//!
//! A minimal real-time kernel with a static footprint:
//! - Fixed priority scheduling, one thread per priority slot
//! - Periodic tick or tickless (timer-delta) time base
//! - Thread queues, counting semaphores and event flags
//! - Context switching for ARM Cortex-M4, plus a host port for testing

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    // Used by portable-atomic, nests with the kernel lock.
    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod sync;
pub mod port;

// ============ Re-exports ============

pub use crate::core::config;
pub use crate::core::config::*;
pub use crate::core::critical;
pub use crate::core::cs_cell;
pub use crate::core::error;
pub use crate::core::error::{HaltReason, Violation};
pub use crate::core::kernel;
pub use crate::core::kernel::System;
pub use crate::core::sched;
pub use crate::core::thread;
pub use crate::core::thread::{ThreadDescriptor, ThreadId, ThreadReference, ThreadState, WorkingArea};
pub use crate::core::time;
pub use crate::core::types;
pub use crate::core::types::*;

#[cfg(target_arch = "arm")]
pub use crate::core::kernel::{start, sys};

pub use sync::queue;
pub use sync::queue::ThreadsQueue;
#[cfg(feature = "semaphores")]
pub use sync::sem;
#[cfg(feature = "semaphores")]
pub use sync::sem::Semaphore;
#[cfg(feature = "events")]
pub use sync::event;
#[cfg(feature = "events")]
pub use sync::event::{EventListener, EventSource};

#[cfg(feature = "pac")]
pub use stm32_metapac as pac;
