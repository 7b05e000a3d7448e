//! Binary/manual-reset events and event-sets (spec §4.4).
//!
//! The teacher's `ipc::event_bus` was a pub/sub event bus keyed by a djb2
//! hash of a channel name, queuing typed payloads per subscriber and waking
//! a single registered `waiter_tid` per subscription — collected under the
//! bus lock, woken outside it (`system_emit`'s "collect tids, wake after
//! dropping lock" shape). This rewrite keeps that collect-then-wake shape
//! but replaces the payload-queue/subscription model with the spec's
//! stateful binary event: no payload, no per-subscriber queue, just a
//! Set/Clear flip that every waiter observes identically.

use alloc::vec::Vec;

use crate::error::{IpcError, Result};
use crate::limits::MAX_EVENT_SET_MEMBERS;
use crate::registry::{CreatePolicy, Registry};
use crate::sched::{Pid, Scheduler, WakeReason, WaitTarget};
use crate::stats::Stats;
use crate::sync::spinlock::Spinlock;
use crate::wait::{Order, WaitQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventState {
    Clear,
    Set,
}

struct EventInner {
    state: EventState,
    auto_reset: bool,
    waiters: WaitQueue,
    /// Ids of event-sets this event is a member of, so `signal`/`broadcast`
    /// can also wake a matching set-waiter (spec §4.4: "the subsystem also
    /// checks for set-waiters and wakes one").
    member_of: Vec<u32>,
}

/// One named event, as held by [`EventTable`].
pub struct Event {
    inner: Spinlock<EventInner>,
}

impl Event {
    fn new(auto_reset: bool) -> Self {
        Event {
            inner: Spinlock::new(EventInner {
                state: EventState::Clear,
                auto_reset,
                waiters: WaitQueue::new(Order::Fifo),
                member_of: Vec::new(),
            }),
        }
    }
}

struct EventSetInner {
    members: Vec<u32>,
    waiters: WaitQueue,
}

/// A wait-any group over a bounded set of member events, as held by
/// [`EventTable`] alongside plain events (spec §3: "Event-set").
pub struct EventSet {
    inner: Spinlock<EventSetInner>,
}

/// Owns both plain events and event-sets — they share the same name space
/// conceptually but spec keeps their operations distinct, so two registries.
pub struct EventTable {
    events: Spinlock<Registry<Event>>,
    sets: Spinlock<Registry<EventSet>>,
}

impl EventTable {
    pub const fn new() -> Self {
        EventTable {
            events: Spinlock::new(Registry::new()),
            sets: Spinlock::new(Registry::new()),
        }
    }

    // ---- Event ----

    pub fn create(&self, name: &str, auto_reset: bool) -> Result<u32> {
        let mut reg = self.events.lock();
        let (id, created) =
            reg.create(name, CreatePolicy::ReturnExisting, |_id| Ok(Event::new(auto_reset)))?;
        if created {
            log::trace!("[EVENT] create id={id} name={name} auto_reset={auto_reset}");
        }
        Ok(id)
    }

    /// `wait`: immediate return if already `Set` (consuming it if
    /// auto-reset); else enqueue FIFO and block forever.
    pub fn wait(&self, id: u32, sched: &dyn Scheduler, stats: &Stats) -> Result<()> {
        self.wait_impl(id, None, sched, stats)
    }

    /// `timedwait(ms)`: as `wait`, but with an absolute deadline.
    pub fn timedwait(&self, id: u32, timeout_ms: u64, sched: &dyn Scheduler, stats: &Stats) -> Result<()> {
        let deadline = sched.monotonic_ms() + timeout_ms;
        self.wait_impl(id, Some(deadline), sched, stats)
    }

    fn wait_impl(
        &self,
        id: u32,
        deadline_ms: Option<u64>,
        sched: &dyn Scheduler,
        stats: &Stats,
    ) -> Result<()> {
        let pid = sched.current_pid();
        {
            let reg = self.events.lock();
            let event = reg.get(id).ok_or(IpcError::NotFound)?;
            let mut inner = event.inner.lock();
            if inner.state == EventState::Set {
                if inner.auto_reset {
                    inner.state = EventState::Clear;
                }
                return Ok(());
            }
            inner.waiters.enqueue(pid, deadline_ms, 0);
            log::trace!("[EVENT] id={id} pid={pid} blocking, deadline_ms={deadline_ms:?}");
        }
        match sched.block(pid, WaitTarget::Event(id), deadline_ms) {
            WakeReason::Signaled(_) => {
                Stats::inc(&stats.events_signaled);
                log::trace!("[EVENT] id={id} pid={pid} woke Signaled");
                Ok(())
            }
            WakeReason::Timeout => {
                Stats::inc(&stats.timeouts);
                log::warn!("[EVENT] id={id} pid={pid} timed out");
                self.remove_event_waiter(id, pid);
                Err(IpcError::Timeout)
            }
            WakeReason::Cancelled => Err(IpcError::Cancelled),
            WakeReason::ObjectDestroyed => Err(IpcError::ObjectDestroyed),
            _ => Err(IpcError::Cancelled),
        }
    }

    /// Drops a stale entry left behind by a timed-out `wait`. Usually
    /// redundant with `expire_timeouts` already having removed it via the
    /// tick hook, but a `Scheduler` that resolves its own deadline (like
    /// `TestScheduler`'s condvar timeout) can return `Timeout` from `block`
    /// before the next tick runs, so this still has to check.
    fn remove_event_waiter(&self, id: u32, pid: Pid) {
        if let Some(event) = self.events.lock().get(id) {
            event.inner.lock().waiters.remove(pid);
        }
    }

    /// `signal`: auto-reset wakes exactly one waiter and stays `Clear` if
    /// any were waiting, else transitions to `Set`; manual-reset always
    /// transitions to `Set` and wakes everyone (spec §4.4 state machine).
    pub fn signal(&self, id: u32, sched: &dyn Scheduler, stats: &Stats) -> Result<()> {
        let reg = self.events.lock();
        let event = reg.get(id).ok_or(IpcError::NotFound)?;
        let mut inner = event.inner.lock();
        Stats::inc(&stats.events_signaled);
        if inner.auto_reset {
            if let Some(waiter) = inner.waiters.dequeue_head() {
                // Handed directly to a waiter without ever touching `state`:
                // no Clear->Set transition occurred, so set-waiters must not
                // be woken here (spec §4.4: no spurious wakeups).
                sched.unblock(waiter, WakeReason::Signaled(id));
                return Ok(());
            }
            inner.state = EventState::Set;
        } else {
            inner.state = EventState::Set;
            inner.waiters.wake_all(WakeReason::Signaled(id), sched);
        }
        self.wake_one_set_waiter(&inner.member_of, id, sched);
        Ok(())
    }

    /// `broadcast`: always wakes every waiter and sets state, regardless of
    /// `auto_reset`.
    pub fn broadcast(&self, id: u32, sched: &dyn Scheduler, stats: &Stats) -> Result<()> {
        let reg = self.events.lock();
        let event = reg.get(id).ok_or(IpcError::NotFound)?;
        let mut inner = event.inner.lock();
        inner.state = EventState::Set;
        Stats::inc(&stats.events_signaled);
        inner.waiters.wake_all(WakeReason::Signaled(id), sched);
        self.wake_one_set_waiter(&inner.member_of, id, sched);
        Ok(())
    }

    /// `reset`: force `Clear`, regardless of current state.
    pub fn reset(&self, id: u32) -> Result<()> {
        let reg = self.events.lock();
        let event = reg.get(id).ok_or(IpcError::NotFound)?;
        event.inner.lock().state = EventState::Clear;
        Ok(())
    }

    pub fn destroy(&self, id: u32, sched: &dyn Scheduler) -> Result<()> {
        let mut reg = self.events.lock();
        {
            let event = reg.get(id).ok_or(IpcError::NotFound)?;
            event.inner.lock().waiters.wake_all(WakeReason::ObjectDestroyed, sched);
        }
        reg.remove(id);
        log::debug!("[EVENT] destroy id={id}");
        Ok(())
    }

    pub fn find_by_name(&self, name: &str) -> Option<u32> {
        self.events.lock().find_by_name(name)
    }

    // ---- Event-set ----

    pub fn create_set(&self, name: &str) -> Result<u32> {
        let mut reg = self.sets.lock();
        let (id, _created) = reg.create(name, CreatePolicy::ReturnExisting, |_id| {
            Ok(EventSet { inner: Spinlock::new(EventSetInner { members: Vec::new(), waiters: WaitQueue::new(Order::Fifo) }) })
        })?;
        Ok(id)
    }

    /// `add`: attach an existing event to the set, recording the back-link
    /// so `signal`/`broadcast` on that event can find this set.
    pub fn add_member(&self, set_id: u32, event_id: u32) -> Result<()> {
        // Validate before mutating either side: a rejected add must never
        // leave the event's back-link pointing at a set that doesn't list it.
        {
            let sets = self.sets.lock();
            let set = sets.get(set_id).ok_or(IpcError::NotFound)?;
            if set.inner.lock().members.len() >= MAX_EVENT_SET_MEMBERS {
                return Err(IpcError::InvalidArg);
            }
        }
        {
            let events = self.events.lock();
            let event = events.get(event_id).ok_or(IpcError::NotFound)?;
            let mut inner = event.inner.lock();
            if !inner.member_of.contains(&set_id) {
                inner.member_of.push(set_id);
            }
        }
        let sets = self.sets.lock();
        let set = sets.get(set_id).ok_or(IpcError::NotFound)?;
        let mut inner = set.inner.lock();
        if !inner.members.contains(&event_id) {
            inner.members.push(event_id);
        }
        Ok(())
    }

    pub fn remove_member(&self, set_id: u32, event_id: u32) -> Result<()> {
        let events = self.events.lock();
        if let Some(event) = events.get(event_id) {
            event.inner.lock().member_of.retain(|&id| id != set_id);
        }
        let sets = self.sets.lock();
        let set = sets.get(set_id).ok_or(IpcError::NotFound)?;
        set.inner.lock().members.retain(|&id| id != event_id);
        Ok(())
    }

    /// `wait`: wait-any over the set's current members; any member already
    /// `Set` satisfies the wait immediately, reporting that member.
    pub fn wait_set(&self, set_id: u32, sched: &dyn Scheduler, stats: &Stats) -> Result<u32> {
        self.wait_set_impl(set_id, None, sched, stats)
    }

    pub fn timedwait_set(
        &self,
        set_id: u32,
        timeout_ms: u64,
        sched: &dyn Scheduler,
        stats: &Stats,
    ) -> Result<u32> {
        let deadline = sched.monotonic_ms() + timeout_ms;
        self.wait_set_impl(set_id, Some(deadline), sched, stats)
    }

    fn wait_set_impl(
        &self,
        set_id: u32,
        deadline_ms: Option<u64>,
        sched: &dyn Scheduler,
        stats: &Stats,
    ) -> Result<u32> {
        let pid = sched.current_pid();
        // Never hold the `sets` and `events` registry locks at once: this
        // function's only job that touches both needs them one at a time, in
        // the same events-before-sets order `signal`/`broadcast`/`remove_member`
        // use, so no two cross-family operations can deadlock on lock order.
        let members = {
            let sets = self.sets.lock();
            let set = sets.get(set_id).ok_or(IpcError::NotFound)?;
            set.inner.lock().members.clone()
        };
        {
            let events = self.events.lock();
            for &member_id in &members {
                if let Some(event) = events.get(member_id) {
                    let mut inner = event.inner.lock();
                    if inner.state == EventState::Set {
                        if inner.auto_reset {
                            inner.state = EventState::Clear;
                        }
                        return Ok(member_id);
                    }
                }
            }
        }
        {
            let sets = self.sets.lock();
            let set = sets.get(set_id).ok_or(IpcError::NotFound)?;
            set.inner.lock().waiters.enqueue(pid, deadline_ms, 0);
        }
        match sched.block(pid, WaitTarget::EventSet(set_id), deadline_ms) {
            WakeReason::Signaled(member_id) => {
                Stats::inc(&stats.events_signaled);
                Ok(member_id)
            }
            WakeReason::Timeout => {
                Stats::inc(&stats.timeouts);
                log::warn!("[EVENT_SET] id={set_id} pid={pid} timed out");
                self.remove_set_waiter(set_id, pid);
                Err(IpcError::Timeout)
            }
            WakeReason::Cancelled => Err(IpcError::Cancelled),
            WakeReason::ObjectDestroyed => Err(IpcError::ObjectDestroyed),
            _ => Err(IpcError::Cancelled),
        }
    }

    fn remove_set_waiter(&self, set_id: u32, pid: Pid) {
        if let Some(set) = self.sets.lock().get(set_id) {
            set.inner.lock().waiters.remove(pid);
        }
    }

    pub fn destroy_set(&self, set_id: u32, sched: &dyn Scheduler) -> Result<()> {
        let mut reg = self.sets.lock();
        {
            let set = reg.get(set_id).ok_or(IpcError::NotFound)?;
            set.inner.lock().waiters.wake_all(WakeReason::ObjectDestroyed, sched);
        }
        reg.remove(set_id);
        Ok(())
    }

    fn wake_one_set_waiter(&self, member_of: &[u32], signaled_event: u32, sched: &dyn Scheduler) {
        if member_of.is_empty() {
            return;
        }
        let sets = self.sets.lock();
        for &set_id in member_of {
            if let Some(set) = sets.get(set_id) {
                set.inner.lock().waiters.wake_one(WakeReason::Signaled(signaled_event), sched);
            }
        }
    }

    /// `check_ipc_timeouts`'s event-family sweep (spec §4.3 tick hook):
    /// wake every event and event-set waiter whose deadline has already
    /// passed, delivering `Timeout`. A no-op for waiters enqueued via plain
    /// `wait`/`wait_set` (`deadline_ms = None`).
    pub fn expire_timeouts(&self, now_ms: u64, sched: &dyn Scheduler) {
        self.events.lock().for_each_mut(|_id, event: &mut Event| {
            event.inner.lock().waiters.expire(now_ms, sched);
        });
        self.sets.lock().for_each_mut(|_id, set: &mut EventSet| {
            set.inner.lock().waiters.expire(now_ms, sched);
        });
    }

    /// Task-death cleanup (spec §4.7, event step): drop `pid` from every
    /// event and event-set wait-queue it occupies, waking it defensively with
    /// `Cancelled` wherever it was actually found blocked (spec §4.7).
    pub fn cleanup_task(&self, pid: Pid, sched: &dyn Scheduler) {
        log::debug!("[EVENT] cleanup walk pid={pid}");
        self.events.lock().for_each_mut(|_id, event: &mut Event| {
            if event.inner.lock().waiters.remove(pid) {
                sched.unblock(pid, WakeReason::Cancelled);
            }
        });
        self.sets.lock().for_each_mut(|_id, set: &mut EventSet| {
            if set.inner.lock().waiters.remove(pid) {
                sched.unblock(pid, WakeReason::Cancelled);
            }
        });
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Lifetime created/destroyed totals across both plain events and
    /// event-sets, for the supervisor's leak heuristic (spec §4.7).
    pub fn created_destroyed_totals(&self) -> (u64, u64) {
        let events = self.events.lock();
        let sets = self.sets.lock();
        (
            events.created_total() + sets.created_total(),
            events.destroyed_total() + sets.destroyed_total(),
        )
    }

    pub fn list(&self) -> Vec<(u32, alloc::string::String)> {
        self.events
            .lock()
            .iter()
            .map(|(id, name, _obj)| (id, alloc::string::String::from(name)))
            .collect()
    }
}

impl Default for EventTable {
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
        let table = Arc::new(EventTable::new());
        let stats = Arc::new(Stats::new());
        let sched = Arc::new(TestScheduler::new());
        let dying = sched.spawn();
        let id = sched.run_as(dying, || table.create("e", true).unwrap());

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
    fn auto_reset_wakes_exactly_one_of_three() {
        let table = Arc::new(EventTable::new());
        let stats = Arc::new(Stats::new());
        let sched = Arc::new(TestScheduler::new());
        let signaler = sched.spawn();
        let id = sched.run_as(signaler, || table.create("e", true).unwrap());

        let waiters = [sched.spawn(), sched.spawn(), sched.spawn()];
        let mut handles = Vec::new();
        for &pid in &waiters {
            let table = table.clone();
            let stats = stats.clone();
            let sched = sched.clone();
            handles.push(thread::spawn(move || {
                sched.run_as(pid, || table.wait(id, &*sched, &stats).unwrap());
            }));
        }
        thread::sleep(Duration::from_millis(30));
        sched.run_as(signaler, || table.signal(id, &*sched, &stats).unwrap());
        thread::sleep(Duration::from_millis(30));
        sched.run_as(signaler, || table.signal(id, &*sched, &stats).unwrap());
        thread::sleep(Duration::from_millis(30));
        sched.run_as(signaler, || table.signal(id, &*sched, &stats).unwrap());
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn broadcast_wakes_all_and_sets_state() {
        let table = Arc::new(EventTable::new());
        let stats = Arc::new(Stats::new());
        let sched = Arc::new(TestScheduler::new());
        let signaler = sched.spawn();
        let id = sched.run_as(signaler, || table.create("b", false).unwrap());

        let waiters: Vec<_> = (0..5).map(|_| sched.spawn()).collect();
        let mut handles = Vec::new();
        for &pid in &waiters {
            let table = table.clone();
            let stats = stats.clone();
            let sched = sched.clone();
            handles.push(thread::spawn(move || {
                sched.run_as(pid, || table.wait(id, &*sched, &stats).unwrap());
            }));
        }
        thread::sleep(Duration::from_millis(30));
        sched.run_as(signaler, || table.broadcast(id, &*sched, &stats).unwrap());
        for h in handles {
            h.join().unwrap();
        }
        // subsequent wait returns immediately: state stays Set (manual-reset)
        sched.run_as(signaler, || table.wait(id, &*sched, &stats).unwrap());
    }

    #[test]
    fn expire_timeouts_wakes_a_waiter_blocked_with_no_self_expiring_deadline() {
        let table = Arc::new(EventTable::new());
        let sched = Arc::new(TestScheduler::new());
        let id = table.create("tick", true).unwrap();
        let pid = sched.spawn();

        // Enqueue directly with an already-past deadline, then block with
        // `None` so only `expire_timeouts` (the tick hook `Supervisor::
        // check_ipc_timeouts` calls) can resume it — not `block`'s own
        // timeout handling, which `TestScheduler` would otherwise use.
        {
            let events = table.events.lock();
            let event = events.get(id).unwrap();
            event.inner.lock().waiters.enqueue(pid, Some(0), 0);
        }
        let sched2 = sched.clone();
        let handle = thread::spawn(move || {
            sched2.run_as(pid, || sched2.block(pid, WaitTarget::Event(id), None))
        });
        thread::sleep(Duration::from_millis(30));
        table.expire_timeouts(sched.monotonic_ms(), &*sched);
        assert_eq!(handle.join().unwrap(), WakeReason::Timeout);
    }

    #[test]
    fn timed_wait_expires() {
        let table = EventTable::new();
        let stats = Stats::new();
        let sched = TestScheduler::new();
        let pid = sched.spawn();
        let id = sched.run_as(pid, || table.create("t", true).unwrap());
        let result = sched.run_as(pid, || table.timedwait(id, 20, &sched, &stats));
        assert_eq!(result, Err(IpcError::Timeout));
    }

    #[test]
    fn add_member_rejected_at_capacity_leaves_no_dangling_back_link() {
        let table = EventTable::new();
        let set_id = table.create_set("full").unwrap();
        let mut member_ids = Vec::new();
        for i in 0..MAX_EVENT_SET_MEMBERS {
            let id = table.create(&format!("e{i}"), true).unwrap();
            table.add_member(set_id, id).unwrap();
            member_ids.push(id);
        }
        let overflow_id = table.create("overflow", true).unwrap();
        assert_eq!(table.add_member(set_id, overflow_id), Err(IpcError::InvalidArg));

        let events = table.events.lock();
        let event = events.get(overflow_id).unwrap();
        assert!(
            !event.inner.lock().member_of.contains(&set_id),
            "rejected add must not leave the event believing it joined the set"
        );
    }

    #[test]
    fn signal_direct_handoff_does_not_spuriously_wake_set_waiter() {
        // E is auto-reset and a member of set ES. A waits directly on E; B
        // waits on ES. signal(E) hands E straight to A without E ever
        // transitioning Clear->Set, so B must not be woken by it.
        let table = Arc::new(EventTable::new());
        let stats = Arc::new(Stats::new());
        let sched = Arc::new(TestScheduler::new());
        let signaler = sched.spawn();
        let (event_id, set_id) = sched.run_as(signaler, || {
            let event_id = table.create("e", true).unwrap();
            let set_id = table.create_set("es").unwrap();
            table.add_member(set_id, event_id).unwrap();
            (event_id, set_id)
        });

        let a = sched.spawn();
        let table_a = table.clone();
        let stats_a = stats.clone();
        let sched_a = sched.clone();
        let a_handle = thread::spawn(move || {
            sched_a.run_as(a, || table_a.wait(event_id, &*sched_a, &stats_a).unwrap());
        });

        let b = sched.spawn();
        let table_b = table.clone();
        let stats_b = stats.clone();
        let sched_b = sched.clone();
        let b_handle = thread::spawn(move || {
            sched_b.run_as(b, || table_b.timedwait_set(set_id, 80, &*sched_b, &stats_b))
        });
        thread::sleep(Duration::from_millis(30));

        sched.run_as(signaler, || table.signal(event_id, &*sched, &stats).unwrap());
        a_handle.join().unwrap();

        // B must still time out: E never transitioned Clear->Set, so it must
        // not have been reported as the cause of a set-wait wakeup.
        assert_eq!(b_handle.join().unwrap(), Err(IpcError::Timeout));
    }
}
