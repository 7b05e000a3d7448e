//! Bounded priority message queues with reply correlation (spec §4.5).
//!
//! The teacher's `ipc::message_queue::MessageQueue` was a single flat
//! `VecDeque`, non-blocking on both ends, with no priority and no reply
//! path (`send` returns `bool`, `receive` returns `Option<Message>`). This
//! keeps its "one spinlock around a `MessageQueueInner`" shape but replaces
//! the single deque with four priority buckets, adds blocking send/receive
//! via [`crate::sched::Scheduler`], and adds the reply table spec §4.5
//! requires for `WAIT_REPLY`.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;

use crate::error::{IpcError, Result};
use crate::limits::MAX_MESSAGE_SIZE;
use crate::registry::{CreatePolicy, Registry};
use crate::sched::{Pid, Scheduler, WakeReason, WaitTarget};
use crate::stats::Stats;
use crate::sync::spinlock::Spinlock;
use crate::wait::{Order, WaitQueue};

/// Message priority band (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low = 0,
    Normal = 1,
    High = 2,
    Urgent = 3,
}

bitflags::bitflags! {
    /// Per-send/receive behavior flags (spec §4.5).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MessageFlags: u8 {
        /// Block the caller instead of returning `QueueFull`/`QueueEmpty`.
        const BLOCKING   = 0b0001;
        /// Insert at the front of the Urgent bucket regardless of priority.
        const URGENT     = 0b0010;
        /// Block the sender until a matching reply arrives or times out.
        const WAIT_REPLY = 0b0100;
        /// Marks this message as a reply constructed by `reply_to_message`.
        const RESPONSE   = 0b1000;
    }
}

/// A message header plus its opaque payload (spec §3).
#[derive(Clone)]
pub struct Message {
    pub sender: Pid,
    pub receiver: Pid,
    pub message_id: u64,
    pub msg_type: u32,
    pub priority: Priority,
    pub flags: MessageFlags,
    pub timestamp_ms: u64,
    pub payload: Vec<u8>,
}

impl Message {
    fn priority_index(&self) -> usize {
        self.priority as usize
    }
}

/// A sender blocked on `WAIT_REPLY`, and — once `reply_to_message` has run —
/// the response addressed to it. Kept out-of-band from the priority
/// buckets: a reply is handed straight back to the one sender waiting on
/// it, never competing for `receive()` with unrelated traffic and never
/// inflating `pending` (spec §4.5: "constructs a RESPONSE message ...
/// delivers it directly ... wakes the original sender").
struct ReplySlot {
    sender: Pid,
    response: Option<Message>,
}

struct QueueInner {
    capacity: usize,
    /// Low, Normal, High, Urgent, in that index order.
    buckets: [VecDeque<Message>; 4],
    pending: usize,
    senders_waiting: WaitQueue,
    receivers_waiting: WaitQueue,
    /// message_id -> reply slot for a sender blocked awaiting a reply (spec §3).
    reply_table: BTreeMap<u64, ReplySlot>,
    next_message_id: u64,
}

impl QueueInner {
    fn new(capacity: usize) -> Self {
        QueueInner {
            capacity,
            buckets: [VecDeque::new(), VecDeque::new(), VecDeque::new(), VecDeque::new()],
            pending: 0,
            senders_waiting: WaitQueue::new(Order::Fifo),
            receivers_waiting: WaitQueue::new(Order::Fifo),
            reply_table: BTreeMap::new(),
            next_message_id: 1,
        }
    }

    /// Highest non-empty bucket, Urgent first.
    fn pop_highest(&mut self) -> Option<Message> {
        for bucket in self.buckets.iter_mut().rev() {
            if let Some(msg) = bucket.pop_front() {
                self.pending -= 1;
                return Some(msg);
            }
        }
        None
    }

    fn push(&mut self, msg: Message) {
        let idx = msg.priority_index();
        if msg.flags.contains(MessageFlags::URGENT) {
            self.buckets[Priority::Urgent as usize].push_front(msg);
        } else {
            self.buckets[idx].push_back(msg);
        }
        self.pending += 1;
    }
}

/// One named queue, as held by [`MessageTable`].
pub struct MessageQueue {
    inner: Spinlock<QueueInner>,
}

/// The message family's table.
pub struct MessageTable {
    registry: Spinlock<Registry<MessageQueue>>,
}

impl MessageTable {
    pub const fn new() -> Self {
        MessageTable { registry: Spinlock::new(Registry::new()) }
    }

    pub fn create(&self, name: &str, capacity: usize) -> Result<u32> {
        let mut reg = self.registry.lock();
        let (id, created) = reg.create(name, CreatePolicy::ReturnExisting, |_id| {
            Ok(MessageQueue { inner: Spinlock::new(QueueInner::new(capacity)) })
        })?;
        if created {
            log::trace!("[MSG] create id={id} name={name} capacity={capacity}");
        }
        Ok(id)
    }

    /// `send(queue, msg, flags)` (spec §4.5 steps 1-7). Returns the assigned
    /// `message_id` and, when `WAIT_REPLY` was set and a matching
    /// `reply_to_message` arrived before any timeout, the `RESPONSE`
    /// message itself.
    pub fn send(
        &self,
        queue_id: u32,
        receiver: Pid,
        msg_type: u32,
        priority: Priority,
        flags: MessageFlags,
        payload: &[u8],
        sched: &dyn Scheduler,
        stats: &Stats,
    ) -> Result<(u64, Option<Message>)> {
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(IpcError::TooLarge);
        }
        let sender = sched.current_pid();
        loop {
            let reg = self.registry.lock();
            let queue = reg.get(queue_id).ok_or(IpcError::NotFound)?;
            let mut inner = queue.inner.lock();

            let message_id = inner.next_message_id;
            inner.next_message_id += 1;
            let msg = Message {
                sender,
                receiver,
                message_id,
                msg_type,
                priority,
                flags,
                timestamp_ms: sched.monotonic_ms(),
                payload: payload.to_vec(),
            };

            if let Some(waiting_receiver) = inner.receivers_waiting.dequeue_head() {
                // Hand off directly: push into its bucket and wake the
                // receiver, who re-enters its loop and pops it straight back
                // out without ever observing the queue as transiently full.
                inner.push(msg);
                if flags.contains(MessageFlags::WAIT_REPLY) {
                    // Register before waking: the receiver can run
                    // reply_to_message as soon as it's unblocked, so the
                    // reply slot must already exist by then.
                    inner.reply_table.insert(message_id, ReplySlot { sender, response: None });
                }
                drop(inner);
                drop(reg);
                Stats::inc(&stats.messages_sent);
                sched.unblock(waiting_receiver, WakeReason::MessageReady);
                return self.await_reply(queue_id, message_id, flags, sender, sched, stats);
            }

            if inner.pending < inner.capacity {
                inner.push(msg);
                if flags.contains(MessageFlags::WAIT_REPLY) {
                    inner.reply_table.insert(message_id, ReplySlot { sender, response: None });
                }
                Stats::inc(&stats.messages_sent);
                drop(inner);
                drop(reg);
                return self.await_reply(queue_id, message_id, flags, sender, sched, stats);
            }

            if !flags.contains(MessageFlags::BLOCKING) {
                Stats::inc(&stats.messages_dropped);
                return Err(IpcError::QueueFull);
            }

            inner.senders_waiting.enqueue(sender, None, 0);
            drop(inner);
            drop(reg);
            log::trace!("[MSG] id={queue_id} pid={sender} blocking, queue full");
            match sched.block(sender, WaitTarget::MessageSend(queue_id), None) {
                WakeReason::MessageReady => continue, // retry from the top, per spec step 5
                WakeReason::Cancelled => return Err(IpcError::Cancelled),
                WakeReason::ObjectDestroyed => return Err(IpcError::ObjectDestroyed),
                _ => return Err(IpcError::Cancelled),
            }
        }
    }

    /// Step 7 of `send`: if `WAIT_REPLY`, block until a matching
    /// `reply_to_message` or timeout. The reply slot itself is registered by
    /// the caller under the queue's lock before the receiver can possibly
    /// run, so by the time this blocks the slot is already there to find.
    fn await_reply(
        &self,
        queue_id: u32,
        message_id: u64,
        flags: MessageFlags,
        sender: Pid,
        sched: &dyn Scheduler,
        stats: &Stats,
    ) -> Result<(u64, Option<Message>)> {
        if !flags.contains(MessageFlags::WAIT_REPLY) {
            return Ok((message_id, None));
        }
        log::trace!("[MSG] id={queue_id} pid={sender} blocking on reply to message_id={message_id}");
        match sched.block(sender, WaitTarget::MessageReply(queue_id), None) {
            WakeReason::MessageReady => {
                let reg = self.registry.lock();
                let queue = reg.get(queue_id).ok_or(IpcError::NotFound)?;
                let response = queue.inner.lock().reply_table.remove(&message_id).and_then(|slot| slot.response);
                log::trace!("[MSG] id={queue_id} pid={sender} woke with reply to message_id={message_id}");
                Ok((message_id, response))
            }
            WakeReason::Timeout => {
                Stats::inc(&stats.timeouts);
                log::warn!("[MSG] id={queue_id} pid={sender} reply to message_id={message_id} timed out");
                self.clear_reply_entry(queue_id, message_id);
                Err(IpcError::Timeout)
            }
            WakeReason::Cancelled => {
                self.clear_reply_entry(queue_id, message_id);
                Err(IpcError::Cancelled)
            }
            WakeReason::ObjectDestroyed => Err(IpcError::ObjectDestroyed),
            _ => Err(IpcError::Cancelled),
        }
    }

    fn clear_reply_entry(&self, queue_id: u32, message_id: u64) {
        if let Some(queue) = self.registry.lock().get(queue_id) {
            queue.inner.lock().reply_table.remove(&message_id);
        }
    }

    /// `receive(queue, out, flags)` (spec §4.5).
    pub fn receive(
        &self,
        queue_id: u32,
        flags: MessageFlags,
        sched: &dyn Scheduler,
        stats: &Stats,
    ) -> Result<Message> {
        let pid = sched.current_pid();
        loop {
            let reg = self.registry.lock();
            let queue = reg.get(queue_id).ok_or(IpcError::NotFound)?;
            let mut inner = queue.inner.lock();

            if let Some(msg) = inner.pop_highest() {
                if let Some(sender) = inner.senders_waiting.dequeue_head() {
                    drop(inner);
                    sched.unblock(sender, WakeReason::MessageReady);
                }
                Stats::inc(&stats.messages_received);
                return Ok(msg);
            }

            if !flags.contains(MessageFlags::BLOCKING) {
                return Err(IpcError::QueueEmpty);
            }

            inner.receivers_waiting.enqueue(pid, None, 0);
            drop(inner);
            drop(reg);
            log::trace!("[MSG] id={queue_id} pid={pid} blocking, queue empty");
            match sched.block(pid, WaitTarget::MessageReceive(queue_id), None) {
                WakeReason::MessageReady => continue,
                WakeReason::Cancelled => return Err(IpcError::Cancelled),
                WakeReason::ObjectDestroyed => return Err(IpcError::ObjectDestroyed),
                _ => return Err(IpcError::Cancelled),
            }
        }
    }

    /// `reply_to_message(original, reply)`: builds a `RESPONSE` message
    /// correlated to `original.message_id` and delivers it directly to the
    /// waiting sender's reply slot — never through a priority bucket, so it
    /// neither competes with ordinary `receive()` traffic nor counts
    /// against `pending`/`capacity` (spec §9 open question: direct delivery
    /// to the original sender).
    pub fn reply_to_message(
        &self,
        queue_id: u32,
        original: &Message,
        payload: &[u8],
        sched: &dyn Scheduler,
    ) -> Result<()> {
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(IpcError::TooLarge);
        }
        let reg = self.registry.lock();
        let queue = reg.get(queue_id).ok_or(IpcError::NotFound)?;
        let mut inner = queue.inner.lock();
        let slot = inner
            .reply_table
            .get_mut(&original.message_id)
            .ok_or(IpcError::NoReceiver)?;
        let sender = slot.sender;
        let reply = Message {
            sender: sched.current_pid(),
            receiver: original.sender,
            message_id: original.message_id,
            msg_type: original.msg_type,
            priority: original.priority,
            flags: MessageFlags::RESPONSE,
            timestamp_ms: sched.monotonic_ms(),
            payload: payload.to_vec(),
        };
        slot.response = Some(reply);
        drop(inner);
        log::trace!("[MSG] id={queue_id} pid={sender} woken with reply to message_id={}", original.message_id);
        sched.unblock(sender, WakeReason::MessageReady);
        Ok(())
    }

    pub fn destroy(&self, queue_id: u32, sched: &dyn Scheduler) -> Result<()> {
        let mut reg = self.registry.lock();
        {
            let queue = reg.get(queue_id).ok_or(IpcError::NotFound)?;
            let mut inner = queue.inner.lock();
            inner.senders_waiting.wake_all(WakeReason::ObjectDestroyed, sched);
            inner.receivers_waiting.wake_all(WakeReason::ObjectDestroyed, sched);
        }
        reg.remove(queue_id);
        log::debug!("[MSG] destroy id={queue_id}");
        Ok(())
    }

    pub fn find_by_name(&self, name: &str) -> Option<u32> {
        self.registry.lock().find_by_name(name)
    }

    /// Number of messages currently held across all four priority buckets
    /// (spec §3 invariant: `sum(bucket.len) == pending <= capacity`).
    pub fn pending(&self, queue_id: u32) -> Result<usize> {
        let reg = self.registry.lock();
        let queue = reg.get(queue_id).ok_or(IpcError::NotFound)?;
        Ok(queue.inner.lock().pending)
    }

    /// `check_ipc_timeouts`'s message-family sweep (spec §4.3 tick hook):
    /// wake every blocked sender/receiver whose deadline has already passed.
    /// Currently a no-op in practice — `send`/`receive`'s `BLOCKING` wait and
    /// `WAIT_REPLY`'s reply-wait both enqueue with `deadline_ms = None`
    /// (spec §9 open question) — but wired so a future deadlined variant
    /// needs no further change here.
    pub fn expire_timeouts(&self, now_ms: u64, sched: &dyn Scheduler) {
        self.registry.lock().for_each_mut(|_id, queue: &mut MessageQueue| {
            let mut inner = queue.inner.lock();
            inner.senders_waiting.expire(now_ms, sched);
            inner.receivers_waiting.expire(now_ms, sched);
        });
    }

    /// Task-death cleanup (spec §4.7, message step): drop `pid` from
    /// sender/receiver wait-queues and any reply-table entry it owns, waking
    /// it defensively with `Cancelled` wherever it was actually found
    /// blocked (spec §4.7) — including a sender parked in `await_reply`,
    /// which is tracked only via `reply_table`, not a `WaitQueue`.
    pub fn cleanup_task(&self, pid: Pid, sched: &dyn Scheduler) {
        log::debug!("[MSG] cleanup walk pid={pid}");
        let mut reg = self.registry.lock();
        reg.for_each_mut(|_id, queue: &mut MessageQueue| {
            let mut inner = queue.inner.lock();
            let mut cancelled = inner.senders_waiting.remove(pid);
            cancelled |= inner.receivers_waiting.remove(pid);
            let before = inner.reply_table.len();
            inner.reply_table.retain(|_msg_id, slot| slot.sender != pid);
            cancelled |= inner.reply_table.len() != before;
            if cancelled {
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

impl Default for MessageTable {
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
    fn cleanup_wakes_the_dying_receiver_itself_with_cancelled() {
        let table = Arc::new(MessageTable::new());
        let stats = Arc::new(Stats::new());
        let sched = Arc::new(TestScheduler::new());
        let dying = sched.spawn();
        let id = sched.run_as(dying, || table.create("q", 1).unwrap());

        let table2 = table.clone();
        let stats2 = stats.clone();
        let sched2 = sched.clone();
        let handle = thread::spawn(move || {
            sched2.run_as(dying, || {
                table2.receive(id, MessageFlags::BLOCKING, &*sched2, &stats2)
            })
        });
        thread::sleep(Duration::from_millis(30));

        table.cleanup_task(dying, &*sched);
        assert_eq!(handle.join().unwrap(), Err(IpcError::Cancelled));
    }

    #[test]
    fn cleanup_wakes_a_dying_sender_blocked_awaiting_reply() {
        let table = Arc::new(MessageTable::new());
        let stats = Arc::new(Stats::new());
        let sched = Arc::new(TestScheduler::new());
        let dying = sched.spawn();
        let id = sched.run_as(dying, || table.create("q2", 4).unwrap());

        let table2 = table.clone();
        let stats2 = stats.clone();
        let sched2 = sched.clone();
        let handle = thread::spawn(move || {
            sched2.run_as(dying, || {
                table2.send(id, 0, 0, Priority::Normal, MessageFlags::WAIT_REPLY, b"ping", &*sched2, &stats2)
            })
        });
        thread::sleep(Duration::from_millis(30));

        table.cleanup_task(dying, &*sched);
        assert_eq!(handle.join().unwrap(), Err(IpcError::Cancelled));
    }

    #[test]
    fn reply_to_message_with_no_outstanding_sender_is_no_receiver() {
        let table = MessageTable::new();
        let stats = Stats::new();
        let sched = TestScheduler::new();
        let pid = sched.spawn();
        let id = sched.run_as(pid, || table.create("no_receiver", 4).unwrap());

        // Sent without WAIT_REPLY, so no reply-table entry was ever registered.
        sched.run_as(pid, || {
            table.send(id, 0, 0, Priority::Normal, MessageFlags::empty(), b"ping", &sched, &stats).unwrap();
        });
        let original = sched.run_as(pid, || {
            table.receive(id, MessageFlags::empty(), &sched, &stats).unwrap()
        });
        let res = sched.run_as(pid, || table.reply_to_message(id, &original, b"pong", &sched));
        assert_eq!(res, Err(IpcError::NoReceiver));
    }

    fn send(
        table: &MessageTable,
        id: u32,
        sched: &TestScheduler,
        stats: &Stats,
        priority: Priority,
        urgent: bool,
    ) -> u64 {
        let flags = if urgent { MessageFlags::URGENT } else { MessageFlags::empty() };
        table.send(id, 0, 0, priority, flags, b"x", sched, stats).unwrap().0
    }

    #[test]
    fn priority_then_fifo_ordering() {
        let table = MessageTable::new();
        let stats = Stats::new();
        let sched = TestScheduler::new();
        let pid = sched.spawn();
        let id = sched.run_as(pid, || table.create("q", 16).unwrap());

        sched.run_as(pid, || {
            send(&table, id, &sched, &stats, Priority::Low, false); // #1
            send(&table, id, &sched, &stats, Priority::High, false); // #2
            send(&table, id, &sched, &stats, Priority::Normal, false); // #3
            send(&table, id, &sched, &stats, Priority::Urgent, false); // #4
            send(&table, id, &sched, &stats, Priority::High, false); // #5

            let order: Vec<Priority> = (0..5)
                .map(|_| table.receive(id, MessageFlags::empty(), &sched, &stats).unwrap().priority)
                .collect();
            assert_eq!(
                order,
                vec![Priority::Urgent, Priority::High, Priority::High, Priority::Normal, Priority::Low]
            );
        });
    }

    #[test]
    fn urgent_flag_preempts_urgent_bucket_head() {
        let table = MessageTable::new();
        let stats = Stats::new();
        let sched = TestScheduler::new();
        let pid = sched.spawn();
        let id = sched.run_as(pid, || table.create("q2", 16).unwrap());

        sched.run_as(pid, || {
            let (x, _) = table.send(id, 0, 1, Priority::Urgent, MessageFlags::empty(), b"x", &sched, &stats).unwrap();
            let (y, _) = table.send(id, 0, 2, Priority::Urgent, MessageFlags::empty(), b"y", &sched, &stats).unwrap();
            let (z, _) = table.send(id, 0, 3, Priority::Urgent, MessageFlags::URGENT, b"z", &sched, &stats).unwrap();

            let first = table.receive(id, MessageFlags::empty(), &sched, &stats).unwrap();
            let second = table.receive(id, MessageFlags::empty(), &sched, &stats).unwrap();
            let third = table.receive(id, MessageFlags::empty(), &sched, &stats).unwrap();
            assert_eq!(first.message_id, z);
            assert_eq!(second.message_id, x);
            assert_eq!(third.message_id, y);
        });
    }

    #[test]
    fn queue_full_without_blocking_errors() {
        let table = MessageTable::new();
        let stats = Stats::new();
        let sched = TestScheduler::new();
        let pid = sched.spawn();
        let id = sched.run_as(pid, || table.create("full", 1).unwrap());
        sched.run_as(pid, || {
            table.send(id, 0, 0, Priority::Low, MessageFlags::empty(), b"a", &sched, &stats).unwrap();
            let res = table.send(id, 0, 0, Priority::Low, MessageFlags::empty(), b"b", &sched, &stats);
            assert_eq!(res, Err(IpcError::QueueFull));
        });
    }

    #[test]
    fn expire_timeouts_wakes_a_blocked_receiver_past_its_deadline() {
        let table = MessageTable::new();
        let sched = TestScheduler::new();
        let pid = sched.spawn();
        let id = sched.run_as(pid, || table.create("tick", 1).unwrap());

        // Enqueue directly with an already-past deadline, then block with
        // `None` so only `expire_timeouts` (the tick hook) can resume it.
        {
            let reg = table.registry.lock();
            let queue = reg.get(id).unwrap();
            queue.inner.lock().receivers_waiting.enqueue(pid, Some(0), 0);
        }
        std::thread::scope(|s| {
            let handle = s.spawn(|| {
                sched.run_as(pid, || sched.block(pid, WaitTarget::MessageReceive(id), None))
            });
            std::thread::sleep(std::time::Duration::from_millis(30));
            table.expire_timeouts(sched.monotonic_ms(), &sched);
            assert_eq!(handle.join().unwrap(), WakeReason::Timeout);
        });
    }

    #[test]
    fn reply_correlation_round_trip() {
        let table = MessageTable::new();
        let stats = Stats::new();
        let sched = TestScheduler::new();
        let a = sched.spawn();
        let id = sched.run_as(a, || table.create("rt", 4).unwrap());

        // A sends with WAIT_REPLY on a background thread (it blocks).
        let table_a = &table;
        let sched_a = &sched;
        let stats_a = &stats;
        std::thread::scope(|s| {
            s.spawn(move || {
                sched_a.run_as(a, || {
                    let (sent_id, response) = table_a
                        .send(id, 0, 0, Priority::Normal, MessageFlags::WAIT_REPLY, b"ping", sched_a, stats_a)
                        .unwrap();
                    let response = response.expect("WAIT_REPLY must hand back the RESPONSE message");
                    assert_eq!(response.message_id, sent_id);
                    assert_eq!(response.payload, b"pong");
                    assert!(response.flags.contains(MessageFlags::RESPONSE));
                });
            });
            std::thread::sleep(std::time::Duration::from_millis(30));
            let b = sched.spawn();
            sched.run_as(b, || {
                let msg = table.receive(id, MessageFlags::empty(), &sched, &stats).unwrap();
                assert_eq!(msg.message_id, 1);
                table.reply_to_message(id, &msg, b"pong", &sched).unwrap();
            });
        });
        // The reply never touched a bucket: `pending` is back to zero, not
        // wedged toward `capacity` after the round trip.
        assert_eq!(table.pending(id).unwrap(), 0);
    }

    #[test]
    fn many_reply_round_trips_never_inflate_pending() {
        // Regression test: a RESPONSE used to be pushed into the Urgent
        // bucket and counted against `pending`, so repeated WAIT_REPLY
        // cycles against a small-capacity queue would eventually wedge at
        // QueueFull even though every reply was consumed out-of-band.
        let table = MessageTable::new();
        let stats = Stats::new();
        let sched = TestScheduler::new();
        let a = sched.spawn();
        let id = sched.run_as(a, || table.create("rt2", 1).unwrap());

        for _ in 0..5 {
            let table_a = &table;
            let sched_a = &sched;
            let stats_a = &stats;
            std::thread::scope(|s| {
                s.spawn(move || {
                    sched_a.run_as(a, || {
                        let (_id, response) = table_a
                            .send(id, 0, 0, Priority::Normal, MessageFlags::WAIT_REPLY, b"ping", sched_a, stats_a)
                            .unwrap();
                        assert_eq!(response.unwrap().payload, b"pong");
                    });
                });
                std::thread::sleep(std::time::Duration::from_millis(20));
                let b = sched.spawn();
                sched.run_as(b, || {
                    let msg = table.receive(id, MessageFlags::empty(), &sched, &stats).unwrap();
                    table.reply_to_message(id, &msg, b"pong", &sched).unwrap();
                });
            });
        }
    }
}
