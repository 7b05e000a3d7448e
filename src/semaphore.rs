//! Counting semaphore with a configurable ceiling (spec §4.2).
//!
//! Grounded in the teacher's `sync::semaphore::Semaphore`, another "Phase 1"
//! stub (`// TODO Phase 2: block on scheduler`, `// TODO Phase 2: wake one
//! thread from wait queue`). Replaces the spin loop with real suspension and
//! adds the ceiling (`max`) the teacher's version never tracked.

use alloc::vec::Vec;

use crate::error::{IpcError, Result};
use crate::registry::{CreatePolicy, Registry};
use crate::sched::{Pid, Scheduler, WakeReason, WaitTarget};
use crate::stats::Stats;
use crate::sync::spinlock::Spinlock;
use crate::wait::{Order, WaitQueue};

struct SemaphoreState {
    count: u32,
    max: u32,
    waiters: WaitQueue,
}

/// One named counting semaphore, as held by [`SemaphoreTable`].
pub struct Semaphore {
    state: Spinlock<SemaphoreState>,
}

impl Semaphore {
    fn new(initial: u32, max: u32) -> Self {
        Semaphore {
            state: Spinlock::new(SemaphoreState {
                count: initial,
                max,
                waiters: WaitQueue::new(Order::Fifo),
            }),
        }
    }
}

/// The semaphore family's table.
pub struct SemaphoreTable {
    registry: Spinlock<Registry<Semaphore>>,
}

impl SemaphoreTable {
    pub const fn new() -> Self {
        SemaphoreTable { registry: Spinlock::new(Registry::new()) }
    }

    /// `create(name, initial, max=initial or UINT32_MAX)`.
    pub fn create(&self, name: &str, initial: u32, max: Option<u32>) -> Result<u32> {
        let ceiling = max.unwrap_or(u32::MAX);
        if initial > ceiling {
            return Err(IpcError::InvalidArg);
        }
        let mut reg = self.registry.lock();
        let (id, created) = reg.create(name, CreatePolicy::ReturnExisting, |_id| {
            Ok(Semaphore::new(initial, ceiling))
        })?;
        if created {
            log::trace!("[SEM] create id={id} name={name} initial={initial} max={ceiling}");
        }
        Ok(id)
    }

    /// `wait`: decrement if `count > 0`, else enqueue FIFO and block.
    pub fn wait(&self, id: u32, sched: &dyn Scheduler, stats: &Stats) -> Result<()> {
        let pid = sched.current_pid();
        {
            let reg = self.registry.lock();
            let sem = reg.get(id).ok_or(IpcError::NotFound)?;
            let mut state = sem.state.lock();
            if state.count > 0 {
                state.count -= 1;
                Stats::inc(&stats.semaphore_waits);
                return Ok(());
            }
            Stats::inc(&stats.semaphore_contended);
            state.waiters.enqueue(pid, None, 0);
            log::trace!("[SEM] id={id} pid={pid} blocking, count=0");
        }
        match sched.block(pid, WaitTarget::Semaphore(id), None) {
            WakeReason::Acquired => {
                Stats::inc(&stats.semaphore_waits);
                log::trace!("[SEM] id={id} pid={pid} woke Acquired");
                Ok(())
            }
            WakeReason::Cancelled => Err(IpcError::Cancelled),
            WakeReason::ObjectDestroyed => Err(IpcError::ObjectDestroyed),
            _ => Err(IpcError::Cancelled),
        }
    }

    /// `trywait`: non-blocking variant.
    pub fn trywait(&self, id: u32, stats: &Stats) -> Result<()> {
        let reg = self.registry.lock();
        let sem = reg.get(id).ok_or(IpcError::NotFound)?;
        let mut state = sem.state.lock();
        if state.count > 0 {
            state.count -= 1;
            Stats::inc(&stats.semaphore_waits);
            Ok(())
        } else {
            Err(IpcError::WouldBlock)
        }
    }

    /// `post`: if waiters are present, transfer the resource directly to the
    /// head waiter without touching `count`; else increment, bounded by
    /// `max`, failing with `Overflow` at the ceiling.
    pub fn post(&self, id: u32, sched: &dyn Scheduler) -> Result<()> {
        let reg = self.registry.lock();
        let sem = reg.get(id).ok_or(IpcError::NotFound)?;
        let mut state = sem.state.lock();
        if let Some(next) = state.waiters.dequeue_head() {
            sched.unblock(next, WakeReason::Acquired);
            return Ok(());
        }
        if state.count >= state.max {
            return Err(IpcError::Overflow);
        }
        state.count += 1;
        Ok(())
    }

    /// `getvalue`: snapshot of the current count.
    pub fn getvalue(&self, id: u32) -> Result<u32> {
        let reg = self.registry.lock();
        let sem = reg.get(id).ok_or(IpcError::NotFound)?;
        Ok(sem.state.lock().count)
    }

    pub fn destroy(&self, id: u32) -> Result<()> {
        let mut reg = self.registry.lock();
        {
            let sem = reg.get(id).ok_or(IpcError::NotFound)?;
            let state = sem.state.lock();
            if !state.waiters.is_empty() {
                return Err(IpcError::Busy);
            }
        }
        reg.remove(id);
        log::debug!("[SEM] destroy id={id}");
        Ok(())
    }

    pub fn find_by_name(&self, name: &str) -> Option<u32> {
        self.registry.lock().find_by_name(name)
    }

    /// Task-death cleanup (spec §4.7, semaphore step): drop `pid` from
    /// whatever wait-queue it occupies — a semaphore is never "owned" — and,
    /// if it was actually found blocked there, wake it defensively with
    /// `Cancelled` (spec §4.7: "wake `pid` with `Cancelled` reason if still
    /// blocked").
    pub fn cleanup_task(&self, pid: Pid, sched: &dyn Scheduler) {
        log::debug!("[SEM] cleanup walk pid={pid}");
        let mut reg = self.registry.lock();
        reg.for_each_mut(|_id, sem: &mut Semaphore| {
            if sem.state.lock().waiters.remove(pid) {
                sched.unblock(pid, WakeReason::Cancelled);
            }
        });
    }

    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn created_destroyed_totals(&self) -> (u64, u64) {
        let reg = self.registry.lock();
        (reg.created_total(), reg.destroyed_total())
    }

    pub fn list(&self) -> Vec<(u32, alloc::string::String)> {
        self.registry
            .lock()
            .iter()
            .map(|(id, name, _obj)| (id, alloc::string::String::from(name)))
            .collect()
    }
}

impl Default for SemaphoreTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::testing::TestScheduler;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn cleanup_wakes_the_dying_waiter_itself_with_cancelled() {
        let table = Arc::new(SemaphoreTable::new());
        let stats = Arc::new(Stats::new());
        let sched = Arc::new(TestScheduler::new());
        let dying = sched.spawn();
        let id = sched.run_as(dying, || table.create("s", 0, None).unwrap());

        let table2 = table.clone();
        let stats2 = stats.clone();
        let sched2 = sched.clone();
        let handle = thread::spawn(move || {
            sched2.run_as(dying, || table2.wait(id, &*sched2, &stats2))
        });
        thread::sleep(Duration::from_millis(30));

        table.cleanup_task(dying, &*sched);
        assert_eq!(handle.join().unwrap(), Err(IpcError::Cancelled));
    }

    #[test]
    fn wait_and_post_roundtrip() {
        let table = SemaphoreTable::new();
        let stats = Stats::new();
        let sched = TestScheduler::new();
        let pid = sched.spawn();
        sched.run_as(pid, || {
            let id = table.create("s", 1, None).unwrap();
            table.wait(id, &sched, &stats).unwrap();
            assert_eq!(table.getvalue(id).unwrap(), 0);
            table.post(id, &sched).unwrap();
            assert_eq!(table.getvalue(id).unwrap(), 1);
        });
    }

    #[test]
    fn post_above_ceiling_overflows() {
        let table = SemaphoreTable::new();
        let sched = TestScheduler::new();
        let id = table.create("c", 2, Some(2)).unwrap();
        assert_eq!(table.post(id, &sched), Err(IpcError::Overflow));
    }

    #[test]
    fn trywait_fails_at_zero() {
        let table = SemaphoreTable::new();
        let stats = Stats::new();
        let id = table.create("z", 0, None).unwrap();
        assert_eq!(table.trywait(id, &stats), Err(IpcError::WouldBlock));
    }

    #[test]
    fn invariant_count_positive_implies_no_waiters() {
        let table = SemaphoreTable::new();
        let stats = Stats::new();
        let sched = TestScheduler::new();
        let pid = sched.spawn();
        let id = sched.run_as(pid, || table.create("inv", 3, None).unwrap());
        for _ in 0..3 {
            sched.run_as(pid, || table.wait(id, &sched, &stats).unwrap());
        }
        assert_eq!(table.getvalue(id).unwrap(), 0);
    }
}
