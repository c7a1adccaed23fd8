//! # Kernel Trace Sink
//!
//! A minimal, zero-cost-when-disabled trace hook. The kernel calls
//! `trace::emit` at the state transitions listed in `KernelEvent`; with
//! the `trace` feature off, `emit` compiles to nothing and `KernelEvent`
//! values at call sites are never constructed at runtime (the compiler
//! elides the dead argument).
//!
//! This intentionally stays a raw callback rather than a `log`/`defmt`
//! integration: the board support crate installs a sink with
//! `trace::set_sink`, matching the external UART trace collaborator
//! called out in the system overview, not a logging framework.

/// A kernel state transition worth tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelEvent {
    TaskCreated(u8),
    Scheduled { from: u8, to: u8 },
    Blocked { task: u8, on_event: u8 },
    Woken { task: u8, timed_out: bool },
    TickProcessed(u32),
    SemaphoreOverflow(u8),
    QueueFull(u8),
    AssertFailed(&'static str),
}

/// Signature of a trace sink. Installed once by the board support crate.
pub type Sink = fn(KernelEvent);

#[cfg(feature = "trace")]
static mut SINK: Option<Sink> = None;

/// Install a trace sink. Must be called before `kernel::start`; there is
/// no synchronization on the sink pointer itself since it is expected to
/// be set once during system init, before interrupts are enabled.
#[cfg(feature = "trace")]
pub fn set_sink(sink: Sink) {
    unsafe {
        SINK = Some(sink);
    }
}

#[cfg(not(feature = "trace"))]
#[inline(always)]
pub fn set_sink(_sink: Sink) {}

/// Emit a trace event. No-op when the `trace` feature is disabled.
#[cfg(feature = "trace")]
pub fn emit(event: KernelEvent) {
    unsafe {
        if let Some(sink) = SINK {
            sink(event);
        }
    }
}

#[cfg(not(feature = "trace"))]
#[inline(always)]
pub fn emit(_event: KernelEvent) {}
