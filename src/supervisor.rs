//! IPC supervisor: global registry of the five families plus lifecycle,
//! cleanup, timeout, and health-check orchestration (spec §4.7).
//!
//! The teacher models this kind of cross-cutting state as singleton
//! modules — `static SHARED_REGIONS: Spinlock<...>`, free functions like
//! `ipc::shared_memory::cleanup_process` wired straight into `sys_exit`.
//! That fits a single-instance bootable kernel; this crate is a reusable
//! library, so the five family tables and the counters are grouped into one
//! owned [`Supervisor`] value instead of scattered statics — callers
//! (commonly, exactly one per booted kernel, but a host test suite wants
//! many side by side) construct it once and thread it through. The
//! operations themselves — dependency-ordered init, the fixed family walk
//! on task death, the tick-driven timeout sweep, the leak-heuristic health
//! check — follow the teacher's lifecycle shape directly.

use alloc::string::String;
use alloc::vec::Vec;

use crate::event::EventTable;
use crate::mm::MemoryManager;
use crate::message::MessageTable;
use crate::mutex::MutexTable;
use crate::sched::{Pid, Scheduler};
use crate::semaphore::SemaphoreTable;
use crate::shm::ShmTable;
use crate::stats::{Stats, StatsSnapshot};

/// Result of [`Supervisor::check_ipc_health`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Ok,
    /// More than 100 more objects created than destroyed (leak heuristic,
    /// spec §4.7).
    PossibleLeak { created: u64, destroyed: u64 },
    /// More than 10 allocation failures recorded.
    TooManyAllocationFailures { count: u64 },
}

/// A snapshot entry for [`Supervisor::dump`]: one named object in one
/// family.
#[derive(Debug, Clone)]
pub struct ObjectSummary {
    pub family: &'static str,
    pub id: u32,
    pub name: String,
}

/// Owns one instance of every IPC family and the shared statistics block.
/// Construct once per kernel (or per test); every operation takes the
/// collaborator contracts ([`Scheduler`], [`MemoryManager`]) explicitly
/// rather than reaching for a global.
pub struct Supervisor {
    pub mutexes: MutexTable,
    pub semaphores: SemaphoreTable,
    pub events: EventTable,
    pub messages: MessageTable,
    pub shm: ShmTable,
    stats: Stats,
    allocation_failures: core::sync::atomic::AtomicU64,
}

impl Supervisor {
    /// `init_ipc_subsystems`: families have no real init cost here (no
    /// separately-allocated singleton state to fail on), but are
    /// constructed in the spec's dependency order — mutex, semaphore,
    /// event, message, shared-memory — for documentation fidelity, since
    /// every later family uses a mutex internally for its own table.
    pub fn new() -> Self {
        Supervisor {
            mutexes: MutexTable::new(),
            semaphores: SemaphoreTable::new(),
            events: EventTable::new(),
            messages: MessageTable::new(),
            shm: ShmTable::new(),
            stats: Stats::new(),
            allocation_failures: core::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Record a `NoMem` (or other resource-exhaustion) error from any
    /// family, bumping the allocation-failure counter consulted by
    /// `check_ipc_health` (spec §7).
    pub fn record_allocation_failure(&self) {
        self.allocation_failures.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
    }

    /// `cleanup_task_ipc(pid)`: walks families in the fixed order mutex,
    /// semaphore, event, message, shared-memory, releasing/cancelling
    /// everything `pid` held or was waiting on. Each family releases its own
    /// lock before the next is acquired (spec §5: "no cross-family locks are
    /// ever held simultaneously").
    pub fn cleanup_task_ipc(&self, pid: Pid, sched: &dyn Scheduler, mm: &dyn MemoryManager) {
        log::info!("[SUP] cleanup_task_ipc pid={pid}");
        self.mutexes.cleanup_task(pid, sched);
        self.semaphores.cleanup_task(pid, sched);
        self.events.cleanup_task(pid, sched);
        self.messages.cleanup_task(pid, sched);
        self.shm.cleanup_task(pid, mm);
        Stats::inc(&self.stats.tasks_cleaned_up);
    }

    /// `check_ipc_timeouts`: the tick hook (spec §4.3/§9), meant to be
    /// called from the scheduler's own timer tick. Sweeps every family whose
    /// wait-queues can carry a deadline — event/event-set (`timedwait`) and
    /// message send/receive/`WAIT_REPLY` — expiring any waiter whose
    /// deadline has passed. This is the only path that resumes a blocked
    /// task on a `Scheduler` whose `block` suspends until explicitly woken
    /// rather than resolving its own deadline (e.g. a real interrupt-driven
    /// scheduler, as opposed to `TestScheduler`'s condvar timeout). Mutex
    /// and semaphore waiters never carry deadlines per spec §4.1/§4.2, so
    /// those families have nothing to expire and are intentionally absent.
    pub fn check_ipc_timeouts(&self, sched: &dyn Scheduler) {
        let now_ms = sched.monotonic_ms();
        self.events.expire_timeouts(now_ms, sched);
        self.messages.expire_timeouts(now_ms, sched);
    }

    /// `check_ipc_health`: unhealthy if the leak heuristic trips or
    /// allocation failures exceed the threshold (spec §4.7). The leak
    /// heuristic sums created/destroyed totals across all five families,
    /// rather than any single family's counters, matching spec §3's
    /// process-wide "created, destroyed" statistics.
    pub fn check_ipc_health(&self) -> Health {
        let (mc, md) = self.mutexes.created_destroyed_totals();
        let (sc, sd) = self.semaphores.created_destroyed_totals();
        let (ec, ed) = self.events.created_destroyed_totals();
        let (qc, qd) = self.messages.created_destroyed_totals();
        let (rc, rd) = self.shm.created_destroyed_totals();
        let created = mc + sc + ec + qc + rc;
        let destroyed = md + sd + ed + qd + rd;
        if created > destroyed + 100 {
            log::warn!("[SUP] possible leak: created={created} destroyed={destroyed}");
            return Health::PossibleLeak { created, destroyed };
        }
        let failures = self.allocation_failures.load(core::sync::atomic::Ordering::Relaxed);
        if failures > 10 {
            log::warn!("[SUP] too many allocation failures: {failures}");
            return Health::TooManyAllocationFailures { count: failures };
        }
        Health::Ok
    }

    /// `dump`: introspection snapshot of every named object across every
    /// family (SPEC_FULL §10 supplement, grounded in the teacher's
    /// `task::scheduler::list_threads`/`ThreadInfo` pattern of returning a
    /// plain `Vec` for a debug console to print).
    pub fn dump(&self) -> Vec<ObjectSummary> {
        let mut out = Vec::new();
        for (id, name) in self.mutexes.list() {
            out.push(ObjectSummary { family: "mutex", id, name });
        }
        for (id, name) in self.semaphores.list() {
            out.push(ObjectSummary { family: "semaphore", id, name });
        }
        for (id, name) in self.events.list() {
            out.push(ObjectSummary { family: "event", id, name });
        }
        for (id, name) in self.messages.list() {
            out.push(ObjectSummary { family: "message_queue", id, name });
        }
        for (id, name) in self.shm.list() {
            out.push(ObjectSummary { family: "shared_memory", id, name });
        }
        out
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::mm::{PhysAddr, Permissions, VirtAddr};
    use crate::testing::TestScheduler;

    struct NullMm;
    impl MemoryManager for NullMm {
        fn alloc_pages(&self, _n: usize) -> Option<PhysAddr> {
            Some(PhysAddr(0x1000))
        }
        fn map(&self, _pid: Pid, _hint: VirtAddr, _phys: PhysAddr, _n: usize, _perms: Permissions) -> Option<VirtAddr> {
            Some(VirtAddr(0x4000_0000))
        }
        fn unmap(&self, _pid: Pid, _virt: VirtAddr, _n: usize) {}
        fn free_pages(&self, _phys: PhysAddr, _n: usize) {}
        fn realloc_pages(&self, old_phys: PhysAddr, _old_n: usize, _new_n: usize) -> Option<PhysAddr> {
            Some(old_phys)
        }
    }

    #[test]
    fn task_death_releases_mutex_and_drops_semaphore_wait() {
        let sup = Supervisor::new();
        let sched = TestScheduler::new();
        let mm = NullMm;

        let dying = sched.spawn();
        let waiter = sched.spawn();

        let mutex_id = sched.run_as(dying, || {
            let id = sup.mutexes.create("m").unwrap();
            sup.mutexes.lock(id, &sched, sup.stats()).unwrap();
            id
        });
        let sem_id = sched.run_as(dying, || sup.semaphores.create("s", 0, None).unwrap());

        // waiter blocks on the semaphore on another thread
        let sup_ref = &sup;
        let sched_ref = &sched;
        std::thread::scope(|scope| {
            let handle = scope.spawn(move || {
                sched_ref.run_as(waiter, || {
                    let _ = sup_ref.semaphores.wait(sem_id, sched_ref, sup_ref.stats());
                });
            });
            std::thread::sleep(std::time::Duration::from_millis(30));
            sup.cleanup_task_ipc(dying, &sched, &mm);
            // release the waiter so the scope doesn't block forever
            sup.semaphores.post(sem_id, &sched).unwrap();
            handle.join().unwrap();
        });

        // mutex is now free (no other waiter existed)
        assert!(sup.mutexes.trylock(mutex_id, &sched, sup.stats()).is_ok());
    }

    #[test]
    fn dump_lists_objects_across_families() {
        let sup = Supervisor::new();
        sup.mutexes.create("a").unwrap();
        sup.semaphores.create("b", 1, None).unwrap();
        let summary = sup.dump();
        assert!(summary.iter().any(|o| o.family == "mutex" && o.name == "a"));
        assert!(summary.iter().any(|o| o.family == "semaphore" && o.name == "b"));
    }

    #[test]
    fn health_ok_for_light_use_and_leak_after_threshold() {
        let sup = Supervisor::new();
        assert_eq!(sup.check_ipc_health(), Health::Ok);
        for i in 0..101 {
            let name = format!("m{i}");
            sup.mutexes.create(&name).unwrap();
        }
        match sup.check_ipc_health() {
            Health::PossibleLeak { created, destroyed } => {
                assert!(created > destroyed + 100);
            }
            other => panic!("expected PossibleLeak, got {other:?}"),
        }
    }
}
