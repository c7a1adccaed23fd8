//! # MiniRTOS-rs Example Firmware
//!
//! Demonstrates priority-preemptive scheduling, round-robin among peers,
//! a counting semaphore, and a bounded message queue with five tasks:
//!
//! | Task | Priority | Behavior |
//! |------|----------|----------|
//! | `sensor_task` | 5 | Sporadic high-priority producer, posts readings to a queue |
//! | `logger_task` | 3 | Consumes sensor readings from the queue |
//! | `worker_a` / `worker_b` | 2 | Equal-priority peers, round-robin via time slice |
//! | `watchdog_task` | 4 | Periodic, paced by `delay()`, pets a semaphore |
//!
//! `sensor_task` preempts the priority-2 workers the instant it has data.
//! `worker_a`/`worker_b` share priority 2 and alternate every time slice.
//! `watchdog_task` posts a semaphore each period; nothing currently waits
//! on it in this demo, so the count simply accumulates — included to show
//! the semaphore API alongside the queue.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;

use minirtos::kernel;
use minirtos::kernel::queue as queue_svc;
use minirtos::kernel::semaphore as semaphore_svc;

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

/// Sporadic high-priority task: simulates an interrupt-driven sensor
/// reading and hands it off to `logger_task` through a message queue.
extern "C" fn sensor_task() -> ! {
    let mut reading: u32 = 0;
    loop {
        reading = reading.wrapping_add(1);

        let payload = reading as usize as *mut ();
        let _ = queue_svc::send(READING_QUEUE.get(), payload);

        kernel::delay(20);
    }
}

/// Consumes sensor readings as they arrive. Blocks on the queue between
/// readings rather than polling.
extern "C" fn logger_task() -> ! {
    loop {
        match queue_svc::wait(READING_QUEUE.get(), minirtos::config::NO_TIMEOUT) {
            Ok(Ok(_reading)) => {
                // Would forward to a UART trace sink in a real board.
            }
            Ok(Err(_timeout)) | Err(_) => {}
        }
    }
}

/// One of two equal-priority peers. Does a fixed amount of work per slice
/// and lets the time slice expire, demonstrating round-robin.
extern "C" fn worker_a() -> ! {
    loop {
        let mut acc: u32 = 0;
        for _ in 0..50_000 {
            acc = acc.wrapping_add(1);
        }
        core::hint::black_box(acc);
    }
}

/// The second equal-priority peer, identical shape to `worker_a`.
extern "C" fn worker_b() -> ! {
    loop {
        let mut acc: u32 = 0;
        for _ in 0..50_000 {
            acc = acc.wrapping_add(1);
        }
        core::hint::black_box(acc);
    }
}

/// Periodic task, paced purely by `delay()`. Posts a semaphore each period
/// to demonstrate the semaphore API; nothing waits on it in this demo.
extern "C" fn watchdog_task() -> ! {
    loop {
        let _ = semaphore_svc::post(WATCHDOG_SEM.get());
        kernel::delay(100);
    }
}

// ---------------------------------------------------------------------------
// Shared handles
// ---------------------------------------------------------------------------

/// A handle cell that is written once during `main` before any task runs,
/// and only read afterwards — tasks never race on the write.
struct HandleCell<T>(core::cell::UnsafeCell<Option<T>>);

// Safety: written exactly once from `main` before the scheduler starts,
// read only by tasks after the system is running.
unsafe impl<T: Copy> Sync for HandleCell<T> {}

impl<T: Copy> HandleCell<T> {
    const fn new() -> Self {
        Self(core::cell::UnsafeCell::new(None))
    }

    fn set(&self, value: T) {
        unsafe {
            *self.0.get() = Some(value);
        }
    }

    fn get(&self) -> T {
        unsafe { (*self.0.get()).expect("handle used before main initialized it") }
    }
}

static READING_QUEUE: HandleCell<minirtos::queue::QueueHandle> = HandleCell::new();
static WATCHDOG_SEM: HandleCell<minirtos::semaphore::SemaphoreId> = HandleCell::new();

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Firmware entry point. Initializes the kernel, creates the synchronization
/// primitives and tasks, and starts the scheduler. Does not return.
#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();

    kernel::init();

    READING_QUEUE.set(queue_svc::create(4).expect("Failed to create reading queue"));
    WATCHDOG_SEM.set(semaphore_svc::create(0).expect("Failed to create watchdog semaphore"));

    kernel::create_task(sensor_task, 5, Some("sensor")).expect("Failed to create sensor_task");
    kernel::create_task(logger_task, 3, Some("logger")).expect("Failed to create logger_task");
    kernel::create_task(worker_a, 2, Some("worker_a")).expect("Failed to create worker_a");
    kernel::create_task(worker_b, 2, Some("worker_b")).expect("Failed to create worker_b");
    kernel::create_task(watchdog_task, 4, Some("watchdog")).expect("Failed to create watchdog_task");

    kernel::start(cp)
}
