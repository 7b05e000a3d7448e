//! IPC-wide usage counters (SPEC_FULL §10: supplemented introspection,
//! grounded in the teacher's `task::scheduler::SchedulerStats` snapshot
//! struct and its `update_stats`-under-lock pattern).

use core::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing counters for the lifetime of a [`crate::Supervisor`].
/// Each field is an independent atomic rather than one struct behind a lock:
/// callers bump a counter at the point of the event, with no contention
/// against unrelated families.
#[derive(Debug, Default)]
pub struct Stats {
    pub mutex_locks: AtomicU64,
    pub mutex_contended: AtomicU64,
    pub semaphore_waits: AtomicU64,
    pub semaphore_contended: AtomicU64,
    pub events_signaled: AtomicU64,
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub messages_dropped: AtomicU64,
    pub shm_regions_created: AtomicU64,
    pub timeouts: AtomicU64,
    pub tasks_cleaned_up: AtomicU64,
}

/// Point-in-time copy of [`Stats`], returned by `Supervisor::stats()` so
/// callers get a consistent-enough read without holding any lock open.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub mutex_locks: u64,
    pub mutex_contended: u64,
    pub semaphore_waits: u64,
    pub semaphore_contended: u64,
    pub events_signaled: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub shm_regions_created: u64,
    pub timeouts: u64,
    pub tasks_cleaned_up: u64,
}

impl Stats {
    pub const fn new() -> Self {
        Stats {
            mutex_locks: AtomicU64::new(0),
            mutex_contended: AtomicU64::new(0),
            semaphore_waits: AtomicU64::new(0),
            semaphore_contended: AtomicU64::new(0),
            events_signaled: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            shm_regions_created: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            tasks_cleaned_up: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            mutex_locks: self.mutex_locks.load(Ordering::Relaxed),
            mutex_contended: self.mutex_contended.load(Ordering::Relaxed),
            semaphore_waits: self.semaphore_waits.load(Ordering::Relaxed),
            semaphore_contended: self.semaphore_contended.load(Ordering::Relaxed),
            events_signaled: self.events_signaled.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            shm_regions_created: self.shm_regions_created.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            tasks_cleaned_up: self.tasks_cleaned_up.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
