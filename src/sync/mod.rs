//! Synchronization primitives
//!
//! Threads queues are always present, semaphores and events are optional.

pub mod queue;

#[cfg(feature = "semaphores")]
pub mod sem;

#[cfg(feature = "events")]
pub mod event;
