//! # Kernel
//!
//! Top-level kernel initialization and public API for MiniRTOS-rs.
//!
//! The kernel owns the global scheduler instance, provides task creation
//! and lifecycle APIs, and coordinates system startup. All public functions
//! use critical sections to ensure interrupt safety.
//!
//! ## Startup sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()        ← Configure the scheduler instance
//!         ├─► kernel::create_task() ← Register tasks (×N)
//!         └─► kernel::start()       ← Launch scheduler (no return)
//!               ├─► Configure SysTick
//!               ├─► Set interrupt priorities
//!               └─► Start first task via arch::start_first_task()
//! ```

use crate::arch::cortex_m4;
use crate::queue::{QueueError, QueueHandle};
use crate::scheduler::Scheduler;
use crate::semaphore::{SemaphoreError, SemaphoreId};
use crate::sync;
use crate::task::{Message, PendResult, TaskId, WaitOutcome};

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

/// Global scheduler instance.
///
/// # Safety
/// Accessed via `SCHEDULER_PTR`, set during `init()`. All access is through
/// critical sections or from ISR context (where interrupts are already
/// serialized by priority).
static mut SCHEDULER: Scheduler = Scheduler::new();

/// Raw pointer to the global scheduler. Used by the arch layer (PendSV,
/// SysTick handlers) which cannot easily use references.
///
/// # Safety
/// Set once during `init()`, read from ISR context.
#[no_mangle]
pub static mut SCHEDULER_PTR: *mut Scheduler = core::ptr::null_mut();

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Closed error set for kernel service calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsError {
    /// Operation applied to an ECB of the wrong kind (semaphore vs. queue).
    EventType,
    /// `queue::send` found the queue full and nobody waiting to receive.
    QueueFull,
    /// `semaphore::post` would exceed the counter's 16-bit ceiling.
    SemOverflow,
    /// No free ECB/MQCB/task slot left in the relevant static pool.
    Exhausted,
}

impl From<SemaphoreError> for OsError {
    fn from(err: SemaphoreError) -> Self {
        match err {
            SemaphoreError::WrongEventType => OsError::EventType,
            SemaphoreError::Overflow => OsError::SemOverflow,
        }
    }
}

impl From<QueueError> for OsError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::WrongEventType => OsError::EventType,
            QueueError::Full => OsError::QueueFull,
        }
    }
}

/// Outcome reported through a `wait` operation's out-parameter once the
/// caller resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    Timeout,
    Aborted,
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the kernel.
///
/// Must be called before any other kernel function. Resets the global
/// scheduler, publishes `SCHEDULER_PTR` for ISR access, and creates the
/// idle task at priority 0 — it must be the first task in the array, since
/// `schedule()` falls back to `TaskId::IDLE` (task 0) whenever the Ready
/// bitmap is empty.
///
/// # Safety
/// Must be called exactly once, from the main thread, before starting the
/// scheduler.
pub fn init() {
    unsafe {
        SCHEDULER = Scheduler::new();
        SCHEDULER_PTR = &mut SCHEDULER as *mut Scheduler;
        (*SCHEDULER_PTR)
            .create_task(idle_task_entry, 0, Some("idle"))
            .expect("the idle task is always the first slot allocated");
    }
}

/// Idle task body. Runs whenever no other task is ready; must never
/// suspend (`delay`/`semaphore::wait`/`queue::wait` are all forbidden from
/// here). Calls `on_idle()` each pass for a board-specific power-saving
/// hook.
extern "C" fn idle_task_entry() -> ! {
    loop {
        on_idle();
    }
}

/// Idle hook, called once per idle loop iteration. Executes the Cortex-M
/// wait-for-interrupt instruction so the core sleeps until the next tick
/// or external interrupt.
#[inline]
fn on_idle() {
    #[cfg(target_arch = "arm")]
    cortex_m::asm::wfi();
    #[cfg(not(target_arch = "arm"))]
    core::hint::spin_loop();
}

/// Create a new task and register it with the scheduler.
///
/// # Parameters
/// - `entry`: Task entry function. Must be `extern "C" fn() -> !` (never returns).
/// - `priority`: Static priority in `[1, P_MAX]`. Priority 0 is reserved for idle.
/// - `name`: Optional name for diagnostics.
///
/// # Returns
/// - `Ok(task_id)`: The task's id in the scheduler array.
/// - `Err(OsError::Exhausted)`: `MAX_TASKS` has been reached.
pub fn create_task(
    entry: extern "C" fn() -> !,
    priority: u8,
    name: Option<&'static str>,
) -> Result<TaskId, OsError> {
    sync::critical_section(|_cs| unsafe {
        (*SCHEDULER_PTR)
            .create_task(entry, priority, name)
            .ok_or(OsError::Exhausted)
    })
}

/// Start the kernel. **Does not return.**
///
/// Configures the SysTick timer, sets interrupt priorities, and launches
/// the first task. After this call the system is fully preemptive.
///
/// # Safety
/// - `init()` must have been called.
/// - At least one task must have been created.
/// - Must be called from the main thread (not from an ISR).
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    cortex_m4::configure_systick(&mut core_peripherals.SYST);
    cortex_m4::set_interrupt_priorities();

    let first_sp = sync::critical_section(|_cs| unsafe {
        let scheduler = &mut *SCHEDULER_PTR;
        let first = scheduler.schedule();
        scheduler.tasks[first.index()].stack_pointer as *const u32
    });

    unsafe {
        cortex_m4::start_first_task(first_sp);
    }
}

/// Suspend the calling task for `ticks` timer ticks.
///
/// The task moves from Running to the Delayed list and is returned to
/// Ready by the tick handler once its timeout reaches zero. Must not be
/// called by the idle task.
pub fn delay(ticks: u32) {
    sync::critical_section(|_cs| unsafe {
        (*SCHEDULER_PTR).delay(ticks);
    });
    cortex_m4::trigger_pendsv();
}

// ---------------------------------------------------------------------------
// Semaphore service
// ---------------------------------------------------------------------------

pub mod semaphore {
    //! Counting semaphore service built on the shared ECB pool.

    use super::*;

    /// Create a semaphore with the given initial count.
    pub fn create(initial_count: u16) -> Result<SemaphoreId, OsError> {
        sync::critical_section(|_cs| unsafe {
            (*SCHEDULER_PTR)
                .create_semaphore(initial_count)
                .ok_or(OsError::Exhausted)
        })
    }

    /// Wait on a semaphore, blocking the caller for up to `timeout` ticks
    /// (`config::NO_TIMEOUT` to wait forever, `0` to poll without blocking).
    ///
    /// Returns `Ok(())` once the semaphore has been acquired, or the
    /// `WaitError` the kernel reported on resume.
    pub fn wait(id: SemaphoreId, timeout: u32) -> Result<Result<(), WaitError>, OsError> {
        let outcome = sync::critical_section(|_cs| unsafe {
            (*SCHEDULER_PTR).semaphore_wait_begin(id, timeout)
        })?;

        match outcome {
            WaitOutcome::Acquired => Ok(Ok(())),
            WaitOutcome::TimedOut => Ok(Err(WaitError::Timeout)),
            WaitOutcome::Blocked => {
                cortex_m4::trigger_pendsv();
                let (result, _msg) =
                    sync::critical_section(|_cs| unsafe { (*SCHEDULER_PTR).take_pend_result() });
                Ok(pend_result_to_wait(result))
            }
        }
    }

    /// Signal a semaphore, waking its highest-priority waiter if one
    /// exists, or incrementing the counter otherwise.
    ///
    /// Only triggers a context switch when a waiter was actually woken (or
    /// some other pending condition already needs one); a bare counter
    /// increment must not yield the caller to an equal-priority peer.
    pub fn post(id: SemaphoreId) -> Result<(), OsError> {
        let needs_reschedule = sync::critical_section(|_cs| unsafe {
            (*SCHEDULER_PTR).semaphore_post(id)?;
            Ok((*SCHEDULER_PTR).needs_reschedule)
        })?;
        if needs_reschedule {
            cortex_m4::trigger_pendsv();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Message queue service
// ---------------------------------------------------------------------------

pub mod queue {
    //! Bounded message queue service built on the shared ECB pool.

    use super::*;

    /// Create a message queue with the given logical capacity.
    pub fn create(capacity: usize) -> Result<QueueHandle, OsError> {
        sync::critical_section(|_cs| unsafe {
            (*SCHEDULER_PTR)
                .create_queue(capacity)
                .ok_or(OsError::Exhausted)
        })
    }

    /// Send a message. Delivered directly to a waiting task if one exists;
    /// otherwise enqueued. Returns `Err(OsError::QueueFull)` if the queue is
    /// full and nobody is waiting.
    ///
    /// Only triggers a context switch when the send actually woke a
    /// receiver (or some other pending condition already needs one); an
    /// enqueue with nobody waiting must not yield the caller to an
    /// equal-priority peer.
    pub fn send(handle: QueueHandle, msg: Message) -> Result<(), OsError> {
        let needs_reschedule = sync::critical_section(|_cs| unsafe {
            (*SCHEDULER_PTR).queue_send(handle, msg)?;
            Ok((*SCHEDULER_PTR).needs_reschedule)
        })?;
        if needs_reschedule {
            cortex_m4::trigger_pendsv();
        }
        Ok(())
    }

    /// Wait to receive a message, blocking the caller for up to `timeout`
    /// ticks (`config::NO_TIMEOUT` to wait forever, `0` to poll without
    /// blocking).
    pub fn wait(handle: QueueHandle, timeout: u32) -> Result<Result<Message, WaitError>, OsError> {
        let (outcome, immediate) = sync::critical_section(|_cs| unsafe {
            (*SCHEDULER_PTR).queue_wait_begin(handle, timeout)
        })?;

        match outcome {
            WaitOutcome::Acquired => Ok(Ok(immediate.expect("Acquired implies a message"))),
            WaitOutcome::TimedOut => Ok(Err(WaitError::Timeout)),
            WaitOutcome::Blocked => {
                cortex_m4::trigger_pendsv();
                let (result, msg) =
                    sync::critical_section(|_cs| unsafe { (*SCHEDULER_PTR).take_pend_result() });
                Ok(pend_result_to_wait(result).map(|()| msg))
            }
        }
    }
}

/// Translate a resumed task's `PendResult` into the public wait outcome.
fn pend_result_to_wait(result: PendResult) -> Result<(), WaitError> {
    match result {
        PendResult::Ok => Ok(()),
        PendResult::TimedOut => Err(WaitError::Timeout),
        PendResult::Aborted => Err(WaitError::Aborted),
    }
}
