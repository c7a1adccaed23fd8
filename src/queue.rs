//! # Message Queue Control Block (MQCB) Pool
//!
//! A bounded FIFO of opaque message pointers. The original design backs a
//! queue's storage with a caller-supplied array; this port has no heap to
//! carve that array from, so each MQCB carries an inline ring buffer sized
//! to `QUEUE_CAPACITY` and a queue is created with a logical capacity no
//! larger than that.
//!
//! `send` is the direct hand-off path: when a task is already waiting on
//! the queue's event, the message is handed straight to that task's inbox
//! and never touches the ring. Only when nobody is waiting does the
//! message get enqueued. This differs from the literal C source, which
//! always writes to the ring first and only afterwards checks for a
//! waiter — a true bypass is what the distilled behavior calls for, and
//! what `scheduler.rs` implements via this module.

use crate::config::{MAX_QUEUES, QUEUE_CAPACITY};
use crate::event::EventId;
use crate::task::Message;

/// Index into the MQCB pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueId(pub u8);

impl QueueId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Public handle to a message queue. A queue is just an Event Control
/// Block tagged with its MQCB, the same way a semaphore is.
pub type QueueHandle = EventId;

/// Failure modes for `queue::send`/`queue::wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The handle does not refer to a message queue.
    WrongEventType,
    /// `send` found the queue full and nobody waiting to receive directly.
    Full,
}

#[derive(Clone, Copy)]
struct Mqcb {
    storage: [Message; QUEUE_CAPACITY],
    capacity: usize,
    in_idx: usize,
    out_idx: usize,
    count: usize,
    in_use: bool,
}

impl Mqcb {
    const fn empty() -> Self {
        Self {
            storage: [core::ptr::null_mut(); QUEUE_CAPACITY],
            capacity: 0,
            in_idx: 0,
            out_idx: 0,
            count: 0,
            in_use: false,
        }
    }
}

/// Fixed-size pool of Message Queue Control Blocks. Slots are never freed
/// once allocated, matching the kernel's static-lifetime event model.
pub struct MqcbPool {
    slots: [Mqcb; MAX_QUEUES],
    next_free: usize,
}

impl MqcbPool {
    pub const fn new() -> Self {
        Self {
            slots: [Mqcb::empty(); MAX_QUEUES],
            next_free: 0,
        }
    }

    /// Allocate a queue of the given logical capacity. Returns `None` if
    /// the pool is exhausted or `capacity` exceeds `QUEUE_CAPACITY`.
    pub fn create(&mut self, capacity: usize) -> Option<QueueId> {
        if capacity == 0 || capacity > QUEUE_CAPACITY || self.next_free >= MAX_QUEUES {
            return None;
        }
        let idx = self.next_free;
        self.next_free += 1;
        self.slots[idx] = Mqcb {
            capacity,
            in_use: true,
            ..Mqcb::empty()
        };
        Some(QueueId(idx as u8))
    }

    #[inline]
    pub fn is_full(&self, id: QueueId) -> bool {
        let mq = &self.slots[id.index()];
        mq.count >= mq.capacity
    }

    #[inline]
    pub fn is_empty(&self, id: QueueId) -> bool {
        self.slots[id.index()].count == 0
    }

    /// Enqueue a message. Caller must have verified the queue is not full
    /// (direct hand-off bypasses this entirely).
    pub fn enqueue(&mut self, id: QueueId, msg: Message) {
        let mq = &mut self.slots[id.index()];
        mq.storage[mq.in_idx] = msg;
        mq.in_idx = (mq.in_idx + 1) % mq.capacity;
        mq.count += 1;
    }

    /// Dequeue the oldest message. Caller must have verified the queue is
    /// not empty.
    pub fn dequeue(&mut self, id: QueueId) -> Message {
        let mq = &mut self.slots[id.index()];
        let msg = mq.storage[mq.out_idx];
        mq.out_idx = (mq.out_idx + 1) % mq.capacity;
        mq.count -= 1;
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_respects_capacity_bound() {
        let mut pool = MqcbPool::new();
        assert!(pool.create(QUEUE_CAPACITY + 1).is_none());
        assert!(pool.create(0).is_none());
        assert!(pool.create(4).is_some());
    }

    #[test]
    fn enqueue_dequeue_is_fifo_and_wraps() {
        let mut pool = MqcbPool::new();
        let id = pool.create(2).unwrap();

        let a = 0x1000 as Message;
        let b = 0x2000 as Message;
        pool.enqueue(id, a);
        pool.enqueue(id, b);
        assert!(pool.is_full(id));

        assert_eq!(pool.dequeue(id), a);
        assert_eq!(pool.dequeue(id), b);
        assert!(pool.is_empty(id));

        // Wraps around the ring correctly after draining.
        let c = 0x3000 as Message;
        pool.enqueue(id, c);
        assert_eq!(pool.dequeue(id), c);
    }

    #[test]
    fn pool_exhaustion_returns_none() {
        let mut pool = MqcbPool::new();
        for _ in 0..MAX_QUEUES {
            assert!(pool.create(1).is_some());
        }
        assert!(pool.create(1).is_none());
    }
}
