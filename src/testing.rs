//! Host-only [`Scheduler`] test double, shared by every family's unit
//! tests. Grounded in `los_utils`'s pattern of giving a `no_std` crate a
//! `std`-feature-gated test harness that exercises real concurrency (actual
//! OS threads plus a `Condvar`) instead of faking suspension with a busy
//! loop, so the FIFO-ordering and wakeup-latching invariants are tested
//! under genuine scheduling, not a single-threaded simulation.

use crate::sched::{Pid, Scheduler, WakeReason, WaitTarget};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

struct Task {
    /// Latched wake reason: set by `unblock` even if no one is in `block`
    /// yet, so a wake racing ahead of the matching `block` call is never
    /// lost — the requirement `Scheduler::block`'s doc comment specifies.
    woken: Option<WakeReason>,
}

/// A [`Scheduler`] backed by real OS threads and a `Condvar`, for exercising
/// genuine blocking/waking instead of simulating it single-threaded.
pub struct TestScheduler {
    next_pid: Mutex<Pid>,
    tasks: Mutex<HashMap<Pid, Task>>,
    cv: Condvar,
    start: Instant,
}

thread_local! {
    static CURRENT: Cell<Pid> = const { Cell::new(0) };
}

impl TestScheduler {
    pub fn new() -> Self {
        TestScheduler {
            next_pid: Mutex::new(1),
            tasks: Mutex::new(HashMap::new()),
            cv: Condvar::new(),
            start: Instant::now(),
        }
    }

    /// Allocate a fresh pid and register it as a known task.
    pub fn spawn(&self) -> Pid {
        let mut next = self.next_pid.lock().unwrap();
        let pid = *next;
        *next += 1;
        self.tasks.lock().unwrap().insert(pid, Task { woken: None });
        pid
    }

    /// Run `f` on the calling (real) thread with `CURRENT` set to `pid`,
    /// so nested `Scheduler::current_pid()` calls observe it.
    pub fn run_as<R>(&self, pid: Pid, f: impl FnOnce() -> R) -> R {
        CURRENT.with(|c| c.set(pid));
        f()
    }

    /// Remove bookkeeping for a pid that has "died" (used by cleanup tests).
    pub fn retire(&self, pid: Pid) {
        self.tasks.lock().unwrap().remove(&pid);
    }
}

impl Default for TestScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TestScheduler {
    fn current_pid(&self) -> Pid {
        CURRENT.with(|c| c.get())
    }

    fn block(&self, pid: Pid, _target: WaitTarget, deadline_ms: Option<u64>) -> WakeReason {
        let mut tasks = self.tasks.lock().unwrap();
        loop {
            if let Some(task) = tasks.get_mut(&pid) {
                if let Some(reason) = task.woken.take() {
                    return reason;
                }
            }
            let (guard, timeout) = match deadline_ms {
                Some(deadline) => {
                    let now = self.monotonic_ms();
                    let remaining = deadline.saturating_sub(now);
                    let (g, to) = self
                        .cv
                        .wait_timeout(tasks, Duration::from_millis(remaining.max(1)))
                        .unwrap();
                    (g, to.timed_out())
                }
                None => (self.cv.wait(tasks).unwrap(), false),
            };
            tasks = guard;
            if timeout {
                if let Some(task) = tasks.get_mut(&pid) {
                    if let Some(reason) = task.woken.take() {
                        return reason;
                    }
                }
                return WakeReason::Timeout;
            }
        }
    }

    fn unblock(&self, pid: Pid, reason: WakeReason) {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.entry(pid).or_insert(Task { woken: None }).woken = Some(reason);
        self.cv.notify_all();
    }

    fn monotonic_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
