//! # Task List Store
//!
//! Three instances of `TaskList` (Ready, Delayed, Waiting) back the
//! scheduler. Each is an array of `P_MAX + 1` list heads indexed by
//! priority, paired with a bitmap whose bit `p - 1` is set iff head `p` is
//! non-empty. Priority 0 (the idle task) is excluded from the bitmap — the
//! scheduler falls back to it only when the Ready bitmap is zero.
//!
//! Lists are intrusive: a task's `list_prev`/`list_next` fields (in its
//! TCB) are reused by whichever list currently holds it, so insertion and
//! removal never allocate. Because the "node" and the TCB are the same
//! object, `remove_by_tcb`/`remove_by_node` from the reference design
//! collapse into a single O(1) `remove`.

use crate::config::P_MAX;
use crate::event::EventId;
use crate::task::{Tcb, TaskId};

const SLOTS: usize = P_MAX as usize + 1;

/// One of the three kernel task lists, indexed by priority with an O(1)
/// highest-priority lookup via a bitmap.
pub struct TaskList {
    heads: [Option<TaskId>; SLOTS],
    bitmap: u32,
}

impl TaskList {
    pub const fn new() -> Self {
        Self {
            heads: [None; SLOTS],
            bitmap: 0,
        }
    }

    #[inline]
    fn bit(prio: u8) -> u32 {
        1u32 << (prio - 1)
    }

    /// Highest-priority non-empty slot, or `None` if the list is empty.
    /// `log2(bitmap) = 32 - clz(bitmap)` gives O(1) lookup, matching the
    /// bit-scan the reference design specifies.
    #[inline]
    pub fn highest_priority(&self) -> Option<u8> {
        if self.bitmap == 0 {
            None
        } else {
            Some((32 - self.bitmap.leading_zeros()) as u8)
        }
    }

    #[inline]
    pub fn bitmap(&self) -> u32 {
        self.bitmap
    }

    #[inline]
    pub fn head(&self, prio: u8) -> Option<TaskId> {
        self.heads[prio as usize]
    }

    /// Append `id` to the tail of its priority slot. FIFO within a
    /// priority gives round-robin fairness among peers. Priority 0 (idle)
    /// is linked but never reflected in the bitmap.
    pub fn insert(&mut self, tasks: &mut [Tcb; crate::config::MAX_TASKS], id: TaskId) {
        let prio = tasks[id.index()].priority;
        tasks[id.index()].list_prev = None;
        tasks[id.index()].list_next = None;

        match self.heads[prio as usize] {
            None => self.heads[prio as usize] = Some(id),
            Some(head) => {
                let mut cursor = head;
                loop {
                    match tasks[cursor.index()].list_next {
                        Some(next) => cursor = next,
                        None => break,
                    }
                }
                tasks[cursor.index()].list_next = Some(id);
                tasks[id.index()].list_prev = Some(cursor);
            }
        }

        if prio > 0 {
            self.bitmap |= Self::bit(prio);
        }
    }

    /// Unlink `id` from this list using its own `list_prev`/`list_next`.
    /// O(1) regardless of position. Clears the bitmap bit if the slot
    /// becomes empty. Caller asserts `id` is actually a member.
    pub fn remove(&mut self, tasks: &mut [Tcb; crate::config::MAX_TASKS], id: TaskId) {
        let prio = tasks[id.index()].priority;
        let prev = tasks[id.index()].list_prev;
        let next = tasks[id.index()].list_next;

        match prev {
            Some(p) => tasks[p.index()].list_next = next,
            None => self.heads[prio as usize] = next,
        }
        if let Some(n) = next {
            tasks[n.index()].list_prev = prev;
        }

        tasks[id.index()].list_prev = None;
        tasks[id.index()].list_next = None;

        if self.heads[prio as usize].is_none() && prio > 0 {
            self.bitmap &= !Self::bit(prio);
        }
    }

    /// Scan set bits of the bitmap from most significant to least; within
    /// each priority slot, return and unlink the first task whose event
    /// back-pointer equals `event`. Used by `post`/`send` to find the
    /// highest-priority waiter for a given semaphore or queue.
    pub fn remove_highest_waiter_for(
        &mut self,
        tasks: &mut [Tcb; crate::config::MAX_TASKS],
        event: EventId,
    ) -> Option<TaskId> {
        let mut working_set = self.bitmap;
        while working_set != 0 {
            let prio = (32 - working_set.leading_zeros()) as u8;
            let bit = Self::bit(prio);

            let mut cursor = self.heads[prio as usize];
            while let Some(id) = cursor {
                let next = tasks[id.index()].list_next;
                if tasks[id.index()].event == Some(event) {
                    self.remove(tasks, id);
                    return Some(id);
                }
                cursor = next;
            }

            working_set &= !bit;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_TASKS;
    use crate::task::PendKind;

    fn fresh_tasks() -> [Tcb; MAX_TASKS] {
        core::array::from_fn(|_| Tcb::empty())
    }

    #[test]
    fn insert_sets_bitmap_and_fifo_order() {
        let mut tasks = fresh_tasks();
        tasks[1].priority = 3;
        tasks[2].priority = 3;
        tasks[3].priority = 3;

        let mut list = TaskList::new();
        list.insert(&mut tasks, TaskId(1));
        list.insert(&mut tasks, TaskId(2));
        list.insert(&mut tasks, TaskId(3));

        assert_eq!(list.highest_priority(), Some(3));
        assert_eq!(list.bitmap(), 1 << 2);

        // FIFO: 1 -> 2 -> 3
        let head = list.head(3).unwrap();
        assert_eq!(head, TaskId(1));
        assert_eq!(tasks[1].list_next, Some(TaskId(2)));
        assert_eq!(tasks[2].list_next, Some(TaskId(3)));
        assert_eq!(tasks[3].list_next, None);
    }

    #[test]
    fn remove_clears_bit_when_slot_empties() {
        let mut tasks = fresh_tasks();
        tasks[1].priority = 5;
        let mut list = TaskList::new();
        list.insert(&mut tasks, TaskId(1));
        assert_eq!(list.bitmap(), 1 << 4);

        list.remove(&mut tasks, TaskId(1));
        assert_eq!(list.bitmap(), 0);
        assert_eq!(list.head(5), None);
    }

    #[test]
    fn remove_middle_of_priority_slot() {
        let mut tasks = fresh_tasks();
        for i in 1..=3 {
            tasks[i].priority = 2;
        }
        let mut list = TaskList::new();
        list.insert(&mut tasks, TaskId(1));
        list.insert(&mut tasks, TaskId(2));
        list.insert(&mut tasks, TaskId(3));

        list.remove(&mut tasks, TaskId(2));

        assert_eq!(list.head(2), Some(TaskId(1)));
        assert_eq!(tasks[1].list_next, Some(TaskId(3)));
        assert_eq!(tasks[3].list_prev, Some(TaskId(1)));
        // Bit stays set: slot 2 still has tasks 1 and 3.
        assert_eq!(list.bitmap(), 1 << 1);
    }

    #[test]
    fn priority_zero_never_sets_bitmap() {
        let mut tasks = fresh_tasks();
        tasks[0].priority = 0;
        let mut list = TaskList::new();
        list.insert(&mut tasks, TaskId(0));
        assert_eq!(list.bitmap(), 0);
        assert_eq!(list.head(0), Some(TaskId(0)));
    }

    #[test]
    fn remove_highest_waiter_for_scans_msb_first() {
        let mut tasks = fresh_tasks();
        tasks[1].priority = 2;
        tasks[1].event = Some(EventId(0));
        tasks[1].pend_kind = PendKind::Semaphore;
        tasks[2].priority = 6;
        tasks[2].event = Some(EventId(0));
        tasks[2].pend_kind = PendKind::Semaphore;
        tasks[3].priority = 6;
        tasks[3].event = Some(EventId(1)); // different event, same slot

        let mut waiting = TaskList::new();
        waiting.insert(&mut tasks, TaskId(1));
        waiting.insert(&mut tasks, TaskId(2));
        waiting.insert(&mut tasks, TaskId(3));

        let woken = waiting.remove_highest_waiter_for(&mut tasks, EventId(0));
        assert_eq!(woken, Some(TaskId(2)));
        // Task 3 (different event) remains in the priority-6 slot.
        assert_eq!(waiting.head(6), Some(TaskId(3)));
        // Priority-2 slot untouched.
        assert_eq!(waiting.bitmap() & (1 << 1), 1 << 1);
    }

    #[test]
    fn remove_highest_waiter_for_returns_none_if_absent() {
        let mut tasks = fresh_tasks();
        tasks[1].priority = 4;
        tasks[1].event = Some(EventId(0));
        let mut waiting = TaskList::new();
        waiting.insert(&mut tasks, TaskId(1));

        assert_eq!(
            waiting.remove_highest_waiter_for(&mut tasks, EventId(5)),
            None
        );
        // Unrelated slot left intact.
        assert_eq!(waiting.head(4), Some(TaskId(1)));
    }
}
