//! # Scheduler
//!
//! Owns every piece of mutable kernel state: the task array, the three
//! task lists (Ready, Delayed, Waiting), the Event Control Block pool, and
//! the Message Queue Control Block pool. Implements priority-based
//! preemptive scheduling with round-robin among same-priority peers, the
//! tick handler that expires delays and timed waits, and the
//! park/wake orchestration behind semaphores and message queues.
//!
//! ## Scheduling algorithm
//!
//! `schedule()` picks the highest-priority non-empty slot in the Ready
//! list's bitmap (O(1) via leading-zeros) and, within that slot, advances
//! past the currently running task to its next peer — wrapping to the
//! slot's head if the current task has no successor, or returning the
//! head outright if the current task isn't a member of that slot at all.
//! This is exactly `os_schedGetNextTaskToRun`'s rule. A task stays linked
//! in the Ready list while it runs; it is unlinked only when it leaves
//! Ready for Delayed or Waiting.
//!
//! ## Tick handling
//!
//! Every tick sweeps the Delayed list's bitmap end to end, decrementing
//! every task found (not just one per slot) and waking any that reach
//! zero. It also sweeps the Waiting list the same way, but only for tasks
//! with a finite timeout (`timeout != NO_TIMEOUT`) — an infinite wait is
//! left alone. This second sweep has no counterpart in the original
//! control flow, which never time-ticks the Waiting list; it is added
//! here because finite-timeout waits on a semaphore or queue are part of
//! this kernel's external contract and have to expire somehow.

use crate::config::{MAX_TASKS, SEM_MAX_COUNT};
use crate::event::EcbPool;
use crate::list::TaskList;
use crate::queue::{MqcbPool, QueueError, QueueHandle, QueueId};
use crate::semaphore::{SemaphoreError, SemaphoreId};
use crate::task::{Message, PendKind, PendResult, Tcb, TaskId, TaskState, WaitOutcome};
use crate::trace::{self, KernelEvent};

/// The central scheduler state. Stored as a global `static mut` in
/// `kernel.rs` and reached into from ISR context through `SCHEDULER_PTR`.
pub struct Scheduler {
    /// Fixed-size array of TCBs. `TaskId(0)` is reserved for the idle task.
    pub(crate) tasks: [Tcb; MAX_TASKS],

    /// Number of task slots allocated so far (including idle).
    task_count: usize,

    /// The currently running task.
    current: TaskId,

    ready: TaskList,
    delayed: TaskList,
    waiting: TaskList,

    events: EcbPool,
    queues: MqcbPool,

    tick_count: u64,

    /// Set whenever a tick or a primitive operation changes which task
    /// should be running; cleared by `schedule()`. The arch layer checks
    /// this after `tick()` to decide whether to trigger PendSV.
    pub needs_reschedule: bool,
}

impl Scheduler {
    /// Create an empty scheduler. No tasks exist yet — the idle task is
    /// created like any other via `create_task`, and by convention is the
    /// first one `kernel::init` registers, making it `TaskId(0)`.
    pub const fn new() -> Self {
        Self {
            tasks: [Tcb::empty(); MAX_TASKS],
            task_count: 0,
            current: TaskId::IDLE,
            ready: TaskList::new(),
            delayed: TaskList::new(),
            waiting: TaskList::new(),
            events: EcbPool::new(),
            queues: MqcbPool::new(),
            tick_count: 0,
            needs_reschedule: false,
        }
    }

    #[inline]
    pub fn current_task(&self) -> TaskId {
        self.current
    }

    pub fn current_tcb(&self) -> &Tcb {
        &self.tasks[self.current.index()]
    }

    pub fn current_tcb_mut(&mut self) -> &mut Tcb {
        &mut self.tasks[self.current.index()]
    }

    /// Read-only access to any task's control block by id. Used by
    /// diagnostics and by tests that need to assert on a task other than
    /// the currently running one (e.g. confirming a preempted task was
    /// moved back to `Ready` rather than left `Running`).
    pub fn tcb(&self, id: TaskId) -> &Tcb {
        &self.tasks[id.index()]
    }

    // -----------------------------------------------------------------
    // Task creation
    // -----------------------------------------------------------------

    /// Register a new task and link it onto the Ready list.
    ///
    /// Priority 0 is reserved for the idle task, created internally by
    /// `kernel::init` as the first task; callers must pass a priority in
    /// `[1, P_MAX]`. Returns `None` once `MAX_TASKS` slots are in use.
    pub fn create_task(
        &mut self,
        entry: extern "C" fn() -> !,
        priority: u8,
        name: Option<&'static str>,
    ) -> Option<TaskId> {
        debug_assert!(
            (self.task_count == 0 && priority == 0)
                || (1..=crate::config::P_MAX).contains(&priority),
            "task priority out of range"
        );
        if self.task_count >= MAX_TASKS {
            return None;
        }
        let id = TaskId(self.task_count as u8);
        {
            let tcb = &mut self.tasks[id.index()];
            *tcb = Tcb::empty();
            tcb.priority = priority;
            tcb.name = name;
            tcb.active = true;
            tcb.state = TaskState::Ready;
            tcb.ticks_remaining = crate::config::DEFAULT_TIME_SLICE;
            crate::task::init_stack(tcb, entry);
        }
        self.task_count += 1;
        self.ready.insert(&mut self.tasks, id);
        trace::emit(KernelEvent::TaskCreated(id.0));
        Some(id)
    }

    // -----------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------

    /// Select the next task to run and mark the transition. Returns the
    /// chosen task's id; the arch layer uses this to load its stack
    /// pointer.
    pub fn schedule(&mut self) -> TaskId {
        let next = match self.ready.highest_priority() {
            Some(prio) => self.next_peer_in_slot(prio),
            None => TaskId::IDLE,
        };

        if next != self.current {
            if self.tasks[self.current.index()].state == TaskState::Running {
                self.tasks[self.current.index()].state = TaskState::Ready;
            }
            trace::emit(KernelEvent::Scheduled {
                from: self.current.0,
                to: next.0,
            });
            self.current = next;
        }
        self.tasks[next.index()].state = TaskState::Running;

        self.needs_reschedule = false;
        self.current
    }

    /// Round-robin rule within a single priority slot: advance past the
    /// current task to its successor, wrapping to the slot's head; if the
    /// current task isn't in this slot at all, return the head outright.
    fn next_peer_in_slot(&self, prio: u8) -> TaskId {
        let head = match self.ready.head(prio) {
            Some(h) => h,
            None => return TaskId::IDLE,
        };

        let mut cursor = Some(head);
        while let Some(id) = cursor {
            if id == self.current {
                return self.tasks[id.index()].list_next.unwrap_or(head);
            }
            cursor = self.tasks[id.index()].list_next;
        }
        head
    }

    // -----------------------------------------------------------------
    // Tick handling
    // -----------------------------------------------------------------

    pub fn tick(&mut self) {
        self.tick_count += 1;

        self.tick_delayed();
        self.tick_waiting();

        let current = self.current;
        if self.tasks[current.index()].state == TaskState::Running {
            let tcb = &mut self.tasks[current.index()];
            if tcb.ticks_remaining > 0 {
                tcb.ticks_remaining -= 1;
            }
            if tcb.ticks_remaining == 0 {
                tcb.ticks_remaining = crate::config::DEFAULT_TIME_SLICE;
                self.needs_reschedule = true;
            }
        }

        trace::emit(KernelEvent::TickProcessed(self.tick_count as u32));
    }

    fn tick_delayed(&mut self) {
        let mut working_set = self.delayed.bitmap();
        while working_set != 0 {
            let prio = (32 - working_set.leading_zeros()) as u8;
            let bit = 1u32 << (prio - 1);

            let mut cursor = self.delayed.head(prio);
            while let Some(id) = cursor {
                let next = self.tasks[id.index()].list_next;

                self.tasks[id.index()].timeout -= 1;
                if self.tasks[id.index()].timeout == 0 {
                    self.delayed.remove(&mut self.tasks, id);
                    self.tasks[id.index()].state = TaskState::Ready;
                    self.ready.insert(&mut self.tasks, id);
                    self.needs_reschedule = true;
                    trace::emit(KernelEvent::Woken {
                        task: id.0,
                        timed_out: false,
                    });
                }

                cursor = next;
            }

            working_set &= !bit;
        }
    }

    fn tick_waiting(&mut self) {
        let mut working_set = self.waiting.bitmap();
        while working_set != 0 {
            let prio = (32 - working_set.leading_zeros()) as u8;
            let bit = 1u32 << (prio - 1);

            let mut cursor = self.waiting.head(prio);
            while let Some(id) = cursor {
                let next = self.tasks[id.index()].list_next;

                if self.tasks[id.index()].timeout != crate::config::NO_TIMEOUT {
                    self.tasks[id.index()].timeout -= 1;
                    if self.tasks[id.index()].timeout == 0 {
                        self.waiting.remove(&mut self.tasks, id);
                        let tcb = &mut self.tasks[id.index()];
                        tcb.state = TaskState::Ready;
                        tcb.pend_result = PendResult::TimedOut;
                        tcb.event = None;
                        tcb.pend_kind = PendKind::None;
                        self.ready.insert(&mut self.tasks, id);
                        self.needs_reschedule = true;
                        trace::emit(KernelEvent::Woken {
                            task: id.0,
                            timed_out: true,
                        });
                    }
                }

                cursor = next;
            }

            working_set &= !bit;
        }
    }

    // -----------------------------------------------------------------
    // Delay
    // -----------------------------------------------------------------

    /// Move the current task from Ready to Delayed for `ticks`. Never
    /// called for the idle task.
    pub fn delay(&mut self, ticks: u32) {
        if ticks == 0 {
            return;
        }
        let id = self.current;
        debug_assert!(id != TaskId::IDLE, "the idle task must never delay");

        self.ready.remove(&mut self.tasks, id);
        let tcb = &mut self.tasks[id.index()];
        tcb.timeout = ticks;
        tcb.state = TaskState::Delayed;
        self.delayed.insert(&mut self.tasks, id);
        self.needs_reschedule = true;
    }

    // -----------------------------------------------------------------
    // Park / wake — shared by semaphores and message queues
    // -----------------------------------------------------------------

    fn park_current(&mut self, event: crate::event::EventId, kind: PendKind, timeout: u32) {
        let id = self.current;
        debug_assert!(id != TaskId::IDLE, "the idle task must never block");

        self.ready.remove(&mut self.tasks, id);
        let tcb = &mut self.tasks[id.index()];
        tcb.state = match kind {
            PendKind::Semaphore => TaskState::WaitingSem,
            PendKind::MessageQueue => TaskState::WaitingMq,
            PendKind::None => unreachable!("park_current always parks on a real event"),
        };
        tcb.event = Some(event);
        tcb.pend_kind = kind;
        tcb.timeout = timeout;
        tcb.pend_result = PendResult::Ok;
        self.waiting.insert(&mut self.tasks, id);
        self.needs_reschedule = true;

        trace::emit(KernelEvent::Blocked {
            task: id.0,
            on_event: event.0,
        });
    }

    fn wake(&mut self, id: TaskId, message: Message) {
        let tcb = &mut self.tasks[id.index()];
        tcb.pend_result = PendResult::Ok;
        tcb.inbox = message;
        tcb.pend_kind = PendKind::None;
        tcb.event = None;
        tcb.state = TaskState::Ready;
        self.ready.insert(&mut self.tasks, id);
        self.needs_reschedule = true;

        trace::emit(KernelEvent::Woken {
            task: id.0,
            timed_out: false,
        });
    }

    /// Read and clear the current task's most recent wait outcome. Called
    /// by `kernel.rs` right after a wait call resumes.
    pub fn take_pend_result(&mut self) -> (PendResult, Message) {
        let tcb = self.current_tcb_mut();
        let result = tcb.pend_result;
        let msg = tcb.inbox;
        tcb.inbox = core::ptr::null_mut();
        (result, msg)
    }

    // -----------------------------------------------------------------
    // Semaphores
    // -----------------------------------------------------------------

    pub fn create_semaphore(&mut self, initial_count: u16) -> Option<SemaphoreId> {
        self.events.create_semaphore(initial_count)
    }

    /// `Ok(WaitOutcome::Blocked)` means the caller must trigger a context
    /// switch and read the real result back via `take_pend_result` once
    /// rescheduled.
    pub fn semaphore_wait_begin(
        &mut self,
        id: SemaphoreId,
        timeout: u32,
    ) -> Result<WaitOutcome, SemaphoreError> {
        match self.events.semaphore_count(id) {
            None => Err(SemaphoreError::WrongEventType),
            Some(count) if count > 0 => {
                self.events.semaphore_take(id);
                Ok(WaitOutcome::Acquired)
            }
            Some(_) if timeout == 0 => Ok(WaitOutcome::TimedOut),
            Some(_) => {
                self.park_current(id, PendKind::Semaphore, timeout);
                Ok(WaitOutcome::Blocked)
            }
        }
    }

    pub fn semaphore_post(&mut self, id: SemaphoreId) -> Result<(), SemaphoreError> {
        if self.events.semaphore_count(id).is_none() {
            return Err(SemaphoreError::WrongEventType);
        }

        if let Some(waiter) = self.waiting.remove_highest_waiter_for(&mut self.tasks, id) {
            self.wake(waiter, core::ptr::null_mut());
            return Ok(());
        }

        match self.events.semaphore_give(id, SEM_MAX_COUNT) {
            Some(true) => Ok(()),
            Some(false) => Err(SemaphoreError::Overflow),
            None => unreachable!("event type already validated above"),
        }
    }

    // -----------------------------------------------------------------
    // Message queues
    // -----------------------------------------------------------------

    pub fn create_queue(&mut self, capacity: usize) -> Option<QueueHandle> {
        let qid = self.queues.create(capacity)?;
        self.events.create_queue(qid)
    }

    fn queue_id_of(&self, handle: QueueHandle) -> Result<QueueId, QueueError> {
        self.events.queue_id(handle).ok_or(QueueError::WrongEventType)
    }

    /// Direct hand-off send: if a task is already waiting on this queue,
    /// the message goes straight to its inbox and never touches the ring.
    pub fn queue_send(&mut self, handle: QueueHandle, msg: Message) -> Result<(), QueueError> {
        let qid = self.queue_id_of(handle)?;

        if let Some(waiter) = self.waiting.remove_highest_waiter_for(&mut self.tasks, handle) {
            self.wake(waiter, msg);
            return Ok(());
        }

        if self.queues.is_full(qid) {
            return Err(QueueError::Full);
        }
        self.queues.enqueue(qid, msg);
        Ok(())
    }

    /// `Ok((WaitOutcome::Acquired, Some(msg)))` delivers the message
    /// immediately. `Ok((WaitOutcome::Blocked, None))` means the caller
    /// must trigger a context switch and read the message back via
    /// `take_pend_result` once rescheduled.
    pub fn queue_wait_begin(
        &mut self,
        handle: QueueHandle,
        timeout: u32,
    ) -> Result<(WaitOutcome, Option<Message>), QueueError> {
        let qid = self.queue_id_of(handle)?;

        if !self.queues.is_empty(qid) {
            Ok((WaitOutcome::Acquired, Some(self.queues.dequeue(qid))))
        } else if timeout == 0 {
            Ok((WaitOutcome::TimedOut, None))
        } else {
            self.park_current(handle, PendKind::MessageQueue, timeout);
            Ok((WaitOutcome::Blocked, None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn task_a() -> ! {
        loop {}
    }
    extern "C" fn task_b() -> ! {
        loop {}
    }

    fn boot(sched: &mut Scheduler) {
        sched.create_task(task_a, 0, Some("idle")).unwrap();
        sched.schedule(); // idle becomes current/running
    }

    #[test]
    fn idle_runs_when_nothing_else_ready() {
        let mut sched = Scheduler::new();
        boot(&mut sched);
        assert_eq!(sched.current_task(), TaskId::IDLE);
    }

    #[test]
    fn higher_priority_task_preempts_idle() {
        let mut sched = Scheduler::new();
        boot(&mut sched);
        let hi = sched.create_task(task_b, 5, Some("hi")).unwrap();
        let next = sched.schedule();
        assert_eq!(next, hi);
    }

    #[test]
    fn round_robin_among_peers_advances_then_wraps() {
        let mut sched = Scheduler::new();
        boot(&mut sched);
        let t1 = sched.create_task(task_a, 3, Some("p1")).unwrap();
        let t2 = sched.create_task(task_b, 3, Some("p2")).unwrap();

        assert_eq!(sched.schedule(), t1);
        assert_eq!(sched.schedule(), t2);
        // Wraps back to the first peer.
        assert_eq!(sched.schedule(), t1);
    }

    #[test]
    fn delay_removes_from_ready_and_wakes_on_timeout() {
        let mut sched = Scheduler::new();
        boot(&mut sched);
        let t1 = sched.create_task(task_a, 4, Some("p1")).unwrap();
        sched.schedule();
        assert_eq!(sched.current_task(), t1);

        sched.delay(3);
        assert_eq!(sched.tasks[t1.index()].state, TaskState::Delayed);

        sched.tick();
        sched.tick();
        assert_eq!(sched.tasks[t1.index()].state, TaskState::Delayed);
        sched.tick();
        assert_eq!(sched.tasks[t1.index()].state, TaskState::Ready);
    }

    #[test]
    fn semaphore_wait_blocks_then_post_wakes_highest_priority_waiter() {
        let mut sched = Scheduler::new();
        boot(&mut sched);
        let low = sched.create_task(task_a, 2, Some("low")).unwrap();
        let high = sched.create_task(task_b, 6, Some("high")).unwrap();
        let sem = sched.create_semaphore(0).unwrap();

        sched.schedule(); // high runs first
        assert_eq!(sched.current_task(), high);
        assert_eq!(
            sched.semaphore_wait_begin(sem, crate::config::NO_TIMEOUT),
            Ok(WaitOutcome::Blocked)
        );
        assert_eq!(sched.tasks[high.index()].state, TaskState::WaitingSem);

        sched.schedule(); // low now runs
        assert_eq!(sched.current_task(), low);
        assert_eq!(
            sched.semaphore_wait_begin(sem, crate::config::NO_TIMEOUT),
            Ok(WaitOutcome::Blocked)
        );

        sched.semaphore_post(sem).unwrap();
        // Highest-priority waiter (high) is woken, not low.
        assert_eq!(sched.tasks[high.index()].state, TaskState::Ready);
        assert_eq!(sched.tasks[low.index()].state, TaskState::WaitingSem);
    }

    #[test]
    fn semaphore_wait_timeout_expires_via_tick() {
        let mut sched = Scheduler::new();
        boot(&mut sched);
        let t1 = sched.create_task(task_a, 3, Some("p1")).unwrap();
        let sem = sched.create_semaphore(0).unwrap();

        sched.schedule();
        assert_eq!(sched.semaphore_wait_begin(sem, 2), Ok(WaitOutcome::Blocked));

        sched.tick();
        assert_eq!(sched.tasks[t1.index()].state, TaskState::WaitingSem);
        sched.tick();
        assert_eq!(sched.tasks[t1.index()].state, TaskState::Ready);
        assert_eq!(sched.tasks[t1.index()].pend_result, PendResult::TimedOut);
    }

    #[test]
    fn queue_send_direct_handoff_bypasses_ring() {
        let mut sched = Scheduler::new();
        boot(&mut sched);
        let t1 = sched.create_task(task_a, 3, Some("p1")).unwrap();
        let q = sched.create_queue(2).unwrap();

        sched.schedule();
        assert_eq!(
            sched.queue_wait_begin(q, crate::config::NO_TIMEOUT),
            Ok((WaitOutcome::Blocked, None))
        );
        assert_eq!(sched.tasks[t1.index()].state, TaskState::WaitingMq);

        let payload = 0xABCD as Message;
        sched.queue_send(q, payload).unwrap();
        assert_eq!(sched.tasks[t1.index()].state, TaskState::Ready);
        let (result, msg) = {
            sched.current = t1;
            sched.take_pend_result()
        };
        assert_eq!(result, PendResult::Ok);
        assert_eq!(msg, payload);
    }

    #[test]
    fn queue_send_enqueues_when_nobody_waiting_then_full_errors() {
        let mut sched = Scheduler::new();
        boot(&mut sched);
        let q = sched.create_queue(1).unwrap();

        sched.queue_send(q, 0x1 as Message).unwrap();
        assert_eq!(sched.queue_send(q, 0x2 as Message), Err(QueueError::Full));
    }
}
