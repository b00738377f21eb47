//! Core kernel modules
//!
//! Contains the system instance, the scheduler, thread and time management.

pub mod config;
pub mod critical;
pub mod cs_cell;
pub mod error;
pub mod kernel;
pub mod sched;
pub mod thread;
pub mod time;
pub mod types;
