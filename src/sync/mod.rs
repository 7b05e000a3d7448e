//! Low-level synchronization building block shared by every IPC family.
//!
//! Provides only the IRQ-safe [`spinlock::Spinlock`] used internally to
//! protect each family's tables. The user-facing blocking primitives
//! ([`crate::mutex::Mutex`], [`crate::semaphore::Semaphore`], ...) live at
//! the crate root, one module per spec family, since they are the crate's
//! public API rather than internal plumbing.

pub mod spinlock;
