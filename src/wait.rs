//! Generic wait-queue (spec §4.3 / §9): "factor the duplicated FIFO+timeout
//! machinery into a single generic component parameterized by ordering
//! policy". Every family (mutex, semaphore, event, event-set, message) holds
//! one or more [`WaitQueue`]s instead of hand-rolling its own `Vec<Pid>` scan
//! the way the teacher's `ipc::event_bus::Subscription` tracked a single
//! `waiter_tid: Option<u32>` per subscriber.

use crate::sched::{Pid, Scheduler, WakeReason};
use alloc::collections::VecDeque;

/// Ordering policy for a [`WaitQueue`] (spec §3: "Ordering policy is
/// per-primitive (FIFO for mutex/semaphore/event; priority-then-FIFO for
/// messages)"). Mutex/semaphore/event/event-set waiters are always FIFO;
/// `PriorityFifo` exists so the same component can serve a primitive whose
/// waiters themselves carry a priority, without each family re-deriving the
/// insertion logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Fifo,
    PriorityFifo,
}

/// A single blocked task's entry (spec §3: "{pid, deadline_ms_or_never,
/// wake_reason_slot}"). The wake-reason slot itself lives in the
/// `Scheduler` implementation (delivered via `unblock`); this struct only
/// keeps what the wait-queue needs to find and expire the entry.
#[derive(Debug, Clone, Copy)]
struct Waiter {
    pid: Pid,
    deadline_ms: Option<u64>,
    priority: u8,
}

/// An ordered list of blocked tasks attached to one primitive.
pub struct WaitQueue {
    order: Order,
    entries: VecDeque<Waiter>,
}

impl WaitQueue {
    pub const fn new(order: Order) -> Self {
        WaitQueue { order, entries: VecDeque::new() }
    }

    /// Register `pid` as waiting, in wait-queue order. Does not suspend the
    /// task — callers must release their own lock and then call
    /// `Scheduler::block` themselves (spec §5: no cross-family/lock-held
    /// blocking).
    pub fn enqueue(&mut self, pid: Pid, deadline_ms: Option<u64>, priority: u8) {
        match self.order {
            Order::Fifo => self.entries.push_back(Waiter { pid, deadline_ms, priority }),
            Order::PriorityFifo => {
                let pos = self
                    .entries
                    .iter()
                    .position(|w| w.priority < priority)
                    .unwrap_or(self.entries.len());
                self.entries.insert(pos, Waiter { pid, deadline_ms, priority });
            }
        }
    }

    /// Remove and return the head waiter's pid, if any.
    pub fn dequeue_head(&mut self) -> Option<Pid> {
        self.entries.pop_front().map(|w| w.pid)
    }

    /// Remove a specific task from the queue regardless of position (used by
    /// task-death cleanup). Returns `true` if it was present.
    pub fn remove(&mut self, pid: Pid) -> bool {
        if let Some(pos) = self.entries.iter().position(|w| w.pid == pid) {
            self.entries.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Wake the head waiter with `reason`, dropping it from the queue.
    pub fn wake_one(&mut self, reason: WakeReason, sched: &dyn Scheduler) -> Option<Pid> {
        let pid = self.dequeue_head()?;
        sched.unblock(pid, reason);
        Some(pid)
    }

    /// Wake every waiter with `reason`, emptying the queue (spec §4.4
    /// broadcast, spec §7 destruction-while-waiters-present).
    pub fn wake_all(&mut self, reason: WakeReason, sched: &dyn Scheduler) {
        while let Some(pid) = self.entries.pop_front() {
            sched.unblock(pid.pid, reason);
        }
    }

    /// Wake and remove every waiter whose deadline has elapsed, delivering
    /// `WakeReason::Timeout`. Called from the periodic timeout hook (spec
    /// §4.3 `check_ipc_timeouts`).
    pub fn expire(&mut self, now_ms: u64, sched: &dyn Scheduler) {
        self.entries.retain(|w| {
            let expired = w.deadline_ms.is_some_and(|d| now_ms >= d);
            if expired {
                sched.unblock(w.pid, WakeReason::Timeout);
            }
            !expired
        });
    }
}
