//! Error taxonomy shared by every IPC family.
//!
//! Mirrors the abstract kinds of spec §7: each variant carries a stable
//! numeric code (for tracing/telemetry) and a `Display` impl. The crate is
//! `no_std`, so this implements `core::error::Error` rather than
//! `std::error::Error` (stable since Rust 1.81, no allocator or std needed).

use core::fmt;

/// An error returned by an IPC family operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcError {
    /// Backing allocation (physical frames, table slot) could not be satisfied.
    NoMem,
    /// Argument failed validation (bad name, zero-sized request, ...).
    InvalidArg,
    /// Named object or mapping does not exist.
    NotFound,
    /// Exclusive-creation requested but the name already exists.
    Exists,
    /// Object cannot be destroyed or mutated in its current state.
    Busy,
    /// Caller lacks the permission required for the operation.
    Denied,
    /// Non-blocking operation could not complete immediately.
    WouldBlock,
    /// Deadline elapsed before the operation completed.
    Timeout,
    /// Counting primitive would exceed its configured ceiling.
    Overflow,
    /// Payload exceeds the family's maximum size.
    TooLarge,
    /// Queue has no free capacity and the caller did not request blocking.
    QueueFull,
    /// Queue is empty and the caller did not request blocking.
    QueueEmpty,
    /// Caller does not hold the primitive it tried to release.
    NotOwner,
    /// The blocked task was torn down while waiting.
    Cancelled,
    /// The object the caller was waiting on was destroyed.
    ObjectDestroyed,
    /// No sender is waiting on the message this reply was meant for (already
    /// replied to, timed out, or its sender died).
    NoReceiver,
}

impl IpcError {
    /// Stable numeric code, independent of enum declaration order, for logs/traces.
    pub const fn code(self) -> u16 {
        match self {
            IpcError::NoMem => 1,
            IpcError::InvalidArg => 2,
            IpcError::NotFound => 3,
            IpcError::Exists => 4,
            IpcError::Busy => 5,
            IpcError::Denied => 6,
            IpcError::WouldBlock => 7,
            IpcError::Timeout => 8,
            IpcError::Overflow => 9,
            IpcError::TooLarge => 10,
            IpcError::QueueFull => 11,
            IpcError::QueueEmpty => 12,
            IpcError::NotOwner => 13,
            IpcError::Cancelled => 14,
            IpcError::ObjectDestroyed => 15,
            IpcError::NoReceiver => 16,
        }
    }

    /// Returns `true` for errors that should bump the supervisor's
    /// allocation-failure counter (spec §7: "Resource-exhaustion errors
    /// (NoMem) increment the allocation-failure counter").
    pub const fn is_resource_exhaustion(self) -> bool {
        matches!(self, IpcError::NoMem)
    }
}

impl fmt::Display for IpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            IpcError::NoMem => "out of memory",
            IpcError::InvalidArg => "invalid argument",
            IpcError::NotFound => "object not found",
            IpcError::Exists => "object already exists",
            IpcError::Busy => "object busy",
            IpcError::Denied => "permission denied",
            IpcError::WouldBlock => "operation would block",
            IpcError::Timeout => "operation timed out",
            IpcError::Overflow => "counter overflow",
            IpcError::TooLarge => "payload too large",
            IpcError::QueueFull => "queue full",
            IpcError::QueueEmpty => "queue empty",
            IpcError::NotOwner => "caller does not own this object",
            IpcError::Cancelled => "wait cancelled by task death",
            IpcError::ObjectDestroyed => "object destroyed while waiting",
            IpcError::NoReceiver => "no sender waiting on this message",
        };
        write!(f, "{msg} (code {})", self.code())
    }
}

impl core::error::Error for IpcError {}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, IpcError>;
