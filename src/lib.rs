//! IPC substrate for a small preemptive kernel: mutexes, counting
//! semaphores, events and event-sets, bounded priority message queues, and
//! named shared-memory regions, plus the supervisor that ties task
//! lifecycle and timeouts into all five.
//!
//! `no_std` by default; build with the `std` feature to run the test suite
//! on the host, which relies on `critical_section`'s std-backed default
//! critical-section implementation and a real-thread [`Scheduler`]
//! ([`testing::TestScheduler`]) instead of an embedder-provided one.
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod error;
pub mod event;
pub mod hal;
pub mod limits;
pub mod message;
pub mod mm;
pub mod mutex;
pub mod registry;
pub mod sched;
pub mod semaphore;
pub mod shm;
pub mod stats;
pub mod supervisor;
pub mod sync;
pub mod wait;

/// Real-thread [`Scheduler`] test double, public under `std` so both this
/// crate's own unit tests and external `tests/` integration tests can drive
/// blocking operations without an embedder-provided scheduler.
#[cfg(feature = "std")]
pub mod testing;

pub use error::{IpcError, Result};
pub use sched::{Pid, Scheduler, WakeReason, WaitTarget};
pub use supervisor::Supervisor;
