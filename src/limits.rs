//! Compile-time limits shared across families.
//!
//! The teacher kernel hard-codes these as family-local constants
//! (`MAX_MSG_SIZE`, `MAX_QUEUE_DEPTH`, `MAX_PIPE_NAME` in
//! `ipc::message_queue`/`ipc::pipe`); spec §3 fixes the name length and
//! message size, so those two move here as the one shared source of truth.
//! Per-object soft limits (queue capacity, semaphore ceiling, event-set
//! membership) remain constructor arguments, matching spec §4.

/// Maximum length, in bytes, of a named object's name (spec §3: "≤31 chars").
pub const MAX_NAME_LEN: usize = 31;

/// Maximum message payload size in bytes (spec §3).
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Maximum number of member events a single event-set may hold.
pub const MAX_EVENT_SET_MEMBERS: usize = 16;
