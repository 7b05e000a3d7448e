//! Scheduler contract (spec §6): the one collaborator every blocking
//! primitive in this crate depends on, and the only place a "suspend the
//! calling task" operation lives.
//!
//! Grounded in the teacher's `task::scheduler` free functions
//! (`current_tid`, `block_current_thread`, `wake_thread`, and the PIT tick
//! source configured at 100 Hz in `main.rs`) — generalized into a trait so
//! this crate never depends on a specific scheduler implementation, matching
//! spec §1's "out of scope: the scheduler" and §6's narrow-contract framing.

/// Opaque task identifier, minted and owned by the scheduler (spec §3).
pub type Pid = u32;

/// Tagged outcome delivered to a task that was blocked and has resumed
/// (spec §4.3, GLOSSARY "Wake reason").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// The primitive was acquired (mutex owned, semaphore resource granted).
    Acquired,
    /// An event fired; carries the signaling object's id (used by event-sets
    /// to report which member transitioned, spec §4.4).
    Signaled(u32),
    /// A message was handed directly to this (blocked) receiver/sender.
    MessageReady,
    /// The wait's deadline elapsed first.
    Timeout,
    /// The task was torn down while blocked (spec §4.7 `cleanup_task_ipc`).
    Cancelled,
    /// The object being waited on was destroyed out from under the waiter.
    ObjectDestroyed,
}

/// Identifies which family+object a task is blocked on, so the scheduler's
/// task-death hook and diagnostics can report it without the primitive
/// exposing anything beyond this tag (spec §3: "the scheduler enforces
/// [single-wait-queue membership] by setting the task's block-reason
/// pointer").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    Mutex(u32),
    Semaphore(u32),
    Event(u32),
    EventSet(u32),
    MessageSend(u32),
    MessageReceive(u32),
    MessageReply(u32),
}

/// Narrow scheduler contract consumed by every blocking operation.
///
/// Implementations own real task suspension: `block` must not return until
/// a matching `unblock` call (from another task or the timeout hook) has
/// run, or the deadline has elapsed. This crate never touches a run queue,
/// a CPU context, or priorities directly — it only calls through this trait.
pub trait Scheduler: Sync {
    /// The calling task's identifier.
    fn current_pid(&self) -> Pid;

    /// Suspend `pid` until `unblock(pid, _)` is called or `deadline_ms`
    /// (absolute, against [`Scheduler::monotonic_ms`]) elapses, whichever
    /// comes first. Returns the reason the task was resumed.
    ///
    /// Implementations must latch a wake delivered before the matching
    /// `block` call is observed and return it immediately rather than
    /// suspending — callers enqueue `pid` into the primitive's own
    /// wait-queue *before* calling `block`, so an `unblock` racing ahead of
    /// the `block` call is a real (benign) possibility, not a bug, and must
    /// never be a lost wakeup.
    fn block(&self, pid: Pid, target: WaitTarget, deadline_ms: Option<u64>) -> WakeReason;

    /// Make `pid` runnable again, delivering `reason`. No-op if `pid` is not
    /// currently blocked (defensive; spec §4.7 cleanup calls this even when
    /// a waiter may have already been reaped by a timeout race).
    fn unblock(&self, pid: Pid, reason: WakeReason);

    /// Monotonic milliseconds since boot, used as the deadline clock.
    fn monotonic_ms(&self) -> u64;
}
