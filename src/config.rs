//! # Kernel Configuration
//!
//! Compile-time constants governing the scheduler, event pools, and system
//! behavior. All limits are fixed at compile time — no dynamic allocation.

/// Maximum task priority. Priority 0 is reserved for the idle task; the
/// bitmap-indexed task lists use one slot per priority `0..=P_MAX`.
/// The priority bitmap is a `u32`, so this can be raised up to 31 without
/// changing the bitmap representation.
pub const P_MAX: u8 = 8;

/// Maximum number of task slots the system can manage simultaneously
/// (including the idle task). Several tasks may share a priority; this
/// bounds the total task count, not the number of priority levels.
pub const MAX_TASKS: usize = 16;

/// Size of the Event Control Block pool, shared by semaphores and message
/// queues.
pub const MAX_EVENTS: usize = 8;

/// Size of the Message Queue Control Block pool.
pub const MAX_QUEUES: usize = 8;

/// SysTick frequency in Hz. Determines scheduler tick granularity and the
/// unit of `delay()` and wait timeouts.
pub const TICK_HZ: u32 = 1000;

/// Default time slice in ticks. A task runs for this many ticks before the
/// scheduler round-robins to the next peer at the same priority.
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// Per-task stack size in bytes. Must be large enough for the deepest call
/// chain plus the hardware exception frame (32 bytes) and the
/// software-saved context (32 bytes for R4-R11).
pub const STACK_SIZE: usize = 1024;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Sentinel timeout value denoting "wait forever" on `semaphore::wait` and
/// `queue::wait`. Matches the external contract: `timeout == MAX` denotes
/// "no timeout".
pub const NO_TIMEOUT: u32 = u32::MAX;

/// Ceiling for a semaphore's counter. Matches the 16-bit counter carried in
/// the Event Control Block.
pub const SEM_MAX_COUNT: u16 = u16::MAX;

/// Maximum ring-buffer depth for a single message queue. The caller-supplied
/// storage a queue is created with may be shorter than this, but never
/// longer — the ring lives inline in the MQCB rather than behind a
/// caller-owned pointer, since this port has no heap to carve it from.
pub const QUEUE_CAPACITY: usize = 16;
