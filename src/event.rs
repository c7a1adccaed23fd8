//! # Event Control Block (ECB) Pool
//!
//! Semaphores and message queues both park waiting tasks through a shared
//! pool of Event Control Blocks. Each slot carries a tag identifying what
//! kind of event it backs, so a single pool serves both primitives instead
//! of two parallel fixed arrays — matching the `OS_EVENT` pool in the
//! original design, re-expressed here as a tagged variant rather than the
//! source's payload-pointer-as-free-link trick.
//!
//! The pool has no `destroy`: once an event is created it lives for the
//! program's duration, matching the spec's static-allocation model. With
//! no freeing there is nothing to chain into a free list, so allocation is
//! a plain bump counter over the slot array.

use crate::config::MAX_EVENTS;
use crate::queue::QueueId;

/// Index into the ECB pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventId(pub u8);

impl EventId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a live ECB slot backs.
#[derive(Clone, Copy)]
enum EcbSlot {
    /// Unused slot.
    Free,
    /// Counting semaphore: current count.
    Semaphore { count: u16 },
    /// Message queue: back-reference to its MQCB.
    Queue(QueueId),
}

/// Fixed-size pool of Event Control Blocks. Slots are handed out in order
/// and never reclaimed.
pub struct EcbPool {
    slots: [EcbSlot; MAX_EVENTS],
    next_free: usize,
}

impl EcbPool {
    pub const fn new() -> Self {
        Self {
            slots: [EcbSlot::Free; MAX_EVENTS],
            next_free: 0,
        }
    }

    fn alloc(&mut self) -> Option<EventId> {
        if self.next_free >= MAX_EVENTS {
            return None;
        }
        let idx = self.next_free;
        self.next_free += 1;
        Some(EventId(idx as u8))
    }

    /// Allocate an ECB backing a counting semaphore with the given initial
    /// count.
    pub fn create_semaphore(&mut self, initial_count: u16) -> Option<EventId> {
        let id = self.alloc()?;
        self.slots[id.index()] = EcbSlot::Semaphore {
            count: initial_count,
        };
        Some(id)
    }

    /// Allocate an ECB backing a message queue.
    pub fn create_queue(&mut self, queue: QueueId) -> Option<EventId> {
        let id = self.alloc()?;
        self.slots[id.index()] = EcbSlot::Queue(queue);
        Some(id)
    }

    /// Returns the semaphore count at `id`, or `None` if `id` is not a
    /// semaphore.
    pub fn semaphore_count(&self, id: EventId) -> Option<u16> {
        match self.slots[id.index()] {
            EcbSlot::Semaphore { count } => Some(count),
            _ => None,
        }
    }

    /// Decrement the semaphore's count. Caller must have already verified
    /// `count > 0`.
    pub fn semaphore_take(&mut self, id: EventId) -> Option<()> {
        match &mut self.slots[id.index()] {
            EcbSlot::Semaphore { count } => {
                *count -= 1;
                Some(())
            }
            _ => None,
        }
    }

    /// Increment the semaphore's count, up to `ceiling`. Returns `false`
    /// (overflow) if already at the ceiling.
    pub fn semaphore_give(&mut self, id: EventId, ceiling: u16) -> Option<bool> {
        match &mut self.slots[id.index()] {
            EcbSlot::Semaphore { count } => {
                if *count >= ceiling {
                    Some(false)
                } else {
                    *count += 1;
                    Some(true)
                }
            }
            _ => None,
        }
    }

    /// Returns the queue id backing this ECB, or `None` if `id` is not a
    /// queue event.
    pub fn queue_id(&self, id: EventId) -> Option<QueueId> {
        match self.slots[id.index()] {
            EcbSlot::Queue(q) => Some(q),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_semaphore_and_take_give_roundtrip() {
        let mut pool = EcbPool::new();
        let id = pool.create_semaphore(1).expect("pool not exhausted");
        assert_eq!(pool.semaphore_count(id), Some(1));

        pool.semaphore_take(id).unwrap();
        assert_eq!(pool.semaphore_count(id), Some(0));

        assert_eq!(pool.semaphore_give(id, 1), Some(true));
        assert_eq!(pool.semaphore_count(id), Some(1));
    }

    #[test]
    fn semaphore_give_respects_ceiling() {
        let mut pool = EcbPool::new();
        let id = pool.create_semaphore(5).expect("pool not exhausted");
        assert_eq!(pool.semaphore_give(id, 5), Some(false));
        assert_eq!(pool.semaphore_count(id), Some(5));
    }

    #[test]
    fn pool_exhaustion_returns_none() {
        let mut pool = EcbPool::new();
        let mut ids = [EventId(0); MAX_EVENTS];
        for id in ids.iter_mut() {
            *id = pool.create_semaphore(0).expect("should allocate");
        }
        assert!(pool.create_semaphore(0).is_none());
        // Exhaustion leaves existing allocations untouched.
        for id in ids {
            assert_eq!(pool.semaphore_count(id), Some(0));
        }
    }

    #[test]
    fn queue_event_roundtrip() {
        let mut pool = EcbPool::new();
        let qid = QueueId(3);
        let id = pool.create_queue(qid).expect("pool not exhausted");
        assert_eq!(pool.queue_id(id), Some(qid));
        assert_eq!(pool.semaphore_count(id), None);
    }
}
