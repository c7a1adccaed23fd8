//! # Task Control Block
//!
//! Defines the task model for the kernel: the per-task state machine, the
//! intrusive list links shared by the Ready/Delayed/Waiting lists, and the
//! stack-frame synthesis that lets the first dispatch of a task look like a
//! return from interrupt.
//!
//! A task is never on more than one of the three kernel lists at a time, so
//! a single `prev`/`next` pair embedded in the TCB is reused by whichever
//! list currently holds it — there is no separate node allocation.

use crate::config::STACK_SIZE;
use crate::event::EventId;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Index of a task in the scheduler's task array. Priority 0 is reserved
/// for the idle task, which is always `TaskId(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskId(pub u8);

impl TaskId {
    pub const IDLE: TaskId = TaskId(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Opaque message payload exchanged through message queues and delivered
/// directly to a waiter's inbox. Copied by pointer value only — the kernel
/// never dereferences it.
pub type Message = *mut ();

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///   CREATE -> Ready
///   Ready -> Running        (schedule)
///   Running -> Ready        (preemption / time-slice expiry)
///   Running -> Delayed      (delay(ticks))
///   Delayed -> Ready        (tick timeout)
///   Running -> WaitingSem/WaitingMq   (wait on empty/zero event)
///   WaitingSem/WaitingMq -> Ready     (post/send, or tick timeout)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    Delayed,
    WaitingSem,
    WaitingMq,
}

/// Which event class a blocked task is pended on. Kept distinct from
/// `TaskState` because the back-pointer and pend kind must be cleared
/// together by whichever path wakes the task (post, send, or tick timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendKind {
    None,
    Semaphore,
    MessageQueue,
}

/// Outcome of a wait operation, surfaced to the caller once the task
/// resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendResult {
    Ok,
    TimedOut,
    Aborted,
}

/// Immediate outcome of starting a wait, returned before the task (if it
/// had to block) has actually resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The resource was available immediately; no block occurred.
    Acquired,
    /// The task was parked on the Waiting list. The caller must trigger a
    /// context switch and read the real result back once rescheduled.
    Blocked,
    /// `timeout` was zero and the resource was not immediately available.
    TimedOut,
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB) — the central per-task record.
///
/// TCBs live in a fixed-size array owned by the scheduler; `active` marks
/// whether a slot holds a real task. The `list_prev`/`list_next` fields are
/// the task's intrusive link in whichever of Ready/Delayed/Waiting list
/// currently holds it — a task is never on more than one at once.
#[derive(Clone, Copy)]
pub struct Tcb {
    /// Saved stack pointer (PSP). Updated on every context switch.
    pub stack_pointer: *mut u32,

    /// Timeout down-counter in ticks. Meaningful only while the task is on
    /// the Delayed list, or on the Waiting list with a finite wait.
    /// `NO_TIMEOUT` means "no expiry".
    pub timeout: u32,

    /// Static priority in `[0, P_MAX]`. Priority 0 is reserved for idle.
    pub priority: u8,

    /// Non-owning back-pointer to the event this task is blocked on.
    /// `None` unless the task is in a `WaitingSem`/`WaitingMq` state.
    pub event: Option<EventId>,

    /// Which event class `event` refers to, if any.
    pub pend_kind: PendKind,

    /// Result of the most recent (or pending) wait.
    pub pend_result: PendResult,

    /// Message deposited by a waker (`post`/`send`) for this task to pick up
    /// on resume.
    pub inbox: Message,

    /// Optional task name for diagnostics.
    pub name: Option<&'static str>,

    /// Current execution state.
    pub state: TaskState,

    /// Whether this slot holds a live task.
    pub active: bool,

    /// Remaining ticks in the current round-robin time slice.
    pub ticks_remaining: u32,

    /// Intrusive links into whichever task list currently owns this task.
    pub list_prev: Option<TaskId>,
    pub list_next: Option<TaskId>,

    /// Per-task stack memory, 8-byte aligned per the AAPCS.
    #[repr(align(8))]
    pub stack: [u8; STACK_SIZE],
}

// Safety: Tcb holds a raw pointer (`stack_pointer`) and an opaque message
// pointer (`inbox`), both accessed only from within critical sections or
// from the architecture port under interrupt-disable.
unsafe impl Send for Tcb {}
unsafe impl Sync for Tcb {}

impl Tcb {
    /// Create an empty (unallocated) TCB. Used to initialize the static
    /// task array.
    pub const fn empty() -> Self {
        Self {
            stack_pointer: core::ptr::null_mut(),
            timeout: crate::config::NO_TIMEOUT,
            priority: 0,
            event: None,
            pend_kind: PendKind::None,
            pend_result: PendResult::Ok,
            inbox: core::ptr::null_mut(),
            name: None,
            state: TaskState::Ready,
            active: false,
            ticks_remaining: crate::config::DEFAULT_TIME_SLICE,
            list_prev: None,
            list_next: None,
            stack: [0u8; STACK_SIZE],
        }
    }

    /// Returns true if this task is runnable, i.e. sitting on the Ready
    /// list waiting for `schedule()` to pick it.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.active && self.state == TaskState::Ready
    }
}

// ---------------------------------------------------------------------------
// Stack initialization
// ---------------------------------------------------------------------------

/// Synthesize an exception-return frame at the top of a task's stack so
/// that the first dispatch looks like a return from interrupt into the
/// task's entry function.
///
/// ## Stack layout (top = high address, growing down)
///
/// ```text
/// [Hardware-stacked frame]   <- initial PSP (after skipping SW regs) points here
///   xPSR  (Thumb bit set)
///   PC    (task entry point)
///   LR    (task_exit)
///   R12, R3, R2, R1, R0      (debug sentinel values)
/// [Software-saved context]
///   R11..R4                  (debug sentinel values)  <- stack_pointer after init
/// ```
///
/// The region below the frame is filled with `0xDEADBEEF` to aid stack
/// overflow detection.
pub fn init_stack(tcb: &mut Tcb, entry: extern "C" fn() -> !) {
    let stack_top = tcb.stack.as_ptr() as usize + STACK_SIZE;
    // Round down to the 8-byte boundary (AAPCS requirement).
    let aligned_top = stack_top & !0x07;

    // 16 words: 8 software-saved (R4-R11) + 8 hardware-stacked (R0-R3, R12, LR, PC, xPSR).
    let frame_ptr = (aligned_top - 16 * 4) as *mut u32;

    unsafe {
        // Software-saved registers R4-R11, pre-filled with debug sentinels.
        for (i, val) in (4u32..=11).enumerate() {
            *frame_ptr.add(i) = val;
        }

        // Hardware-stacked frame: R0-R3, R12, LR, PC, xPSR.
        *frame_ptr.add(8) = 0; // R0
        *frame_ptr.add(9) = 1; // R1
        *frame_ptr.add(10) = 2; // R2
        *frame_ptr.add(11) = 3; // R3
        *frame_ptr.add(12) = 12; // R12
        *frame_ptr.add(13) = task_exit as u32; // LR, in case the task returns
        *frame_ptr.add(14) = entry as u32; // PC, the task entry point
        *frame_ptr.add(15) = 0x0100_0000; // xPSR, Thumb bit set
    }

    // Fill the unused stack region with a recognizable sentinel.
    let stack_base = tcb.stack.as_mut_ptr() as usize;
    let stack_limit = stack_base.div_ceil(8) * 8;
    let mut p = (frame_ptr as usize) - 4;
    unsafe {
        while p >= stack_limit {
            core::ptr::write_volatile(p as *mut u32, 0xDEAD_BEEFu32);
            p -= 4;
        }
    }

    tcb.stack_pointer = frame_ptr;
}

/// Fallback for tasks that return (entry points are `fn() -> !` and should
/// never reach here). Loops forever rather than running off the stack.
extern "C" fn task_exit() -> ! {
    loop {
        #[cfg(target_arch = "arm")]
        cortex_m::asm::wfi();
        #[cfg(not(target_arch = "arm"))]
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tcb_is_inactive() {
        let tcb = Tcb::empty();
        assert!(!tcb.active);
        assert_eq!(tcb.state, TaskState::Ready);
        assert_eq!(tcb.timeout, crate::config::NO_TIMEOUT);
    }

    #[test]
    fn is_runnable_requires_active_and_ready() {
        let mut tcb = Tcb::empty();
        assert!(!tcb.is_runnable());
        tcb.active = true;
        assert!(tcb.is_runnable());
        tcb.state = TaskState::Delayed;
        assert!(!tcb.is_runnable());
    }

    #[test]
    fn init_stack_sets_entry_and_sentinel_region() {
        let mut tcb = Tcb::empty();
        extern "C" fn dummy_entry() -> ! {
            loop {}
        }
        init_stack(&mut tcb, dummy_entry);
        assert!(!tcb.stack_pointer.is_null());

        unsafe {
            let frame = tcb.stack_pointer;
            assert_eq!(*frame.add(14), dummy_entry as u32); // PC
            assert_eq!(*frame.add(15), 0x0100_0000); // xPSR Thumb bit
        }

        let stack_base = tcb.stack.as_ptr() as usize;
        let first_word = unsafe { core::ptr::read_volatile(stack_base as *const u32) };
        assert_eq!(first_word, 0xDEAD_BEEF);
    }
}
