//! # Counting Semaphores
//!
//! A semaphore is just an Event Control Block tagged as a counter; this
//! module supplies the handle type and the public result type for
//! `semaphore::wait`. The actual blocking/waking orchestration lives on
//! `Scheduler`, since it has to touch the task array, the Waiting list,
//! and the ECB pool together — the same three pieces `OS_Sem_Wait`/
//! `OS_Sem_Post` reach into in the original design.

use crate::event::EventId;

/// Handle to a counting semaphore, returned by `Scheduler::create_semaphore`.
pub type SemaphoreId = EventId;

/// Failure modes for `semaphore::post`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreError {
    /// The id does not refer to a semaphore (e.g. it names a queue event).
    WrongEventType,
    /// The semaphore's count is already at `SEM_MAX_COUNT`.
    Overflow,
}
