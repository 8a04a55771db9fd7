//! # skein - stackful fibers over a worker pool
//!
//! Thread-like sequential code without one OS thread per task. Fibers run
//! cooperatively on a small pool of worker threads and give up their worker
//! only at `yield_now`, `sleep_for/until` or a fiber-side `join`.
//!
//! ## Features
//!
//! - **Stackful**: each fiber owns a guarded stack (corosensei), so blocking
//!   style code suspends anywhere, no `async` colouring
//! - **Two policies**: normal fibers migrate between workers; stick-with-parent
//!   fibers always run on the worker that spawned them
//! - **Thread-like handles**: `join`, `detach`, names, captured panics
//! - **Reactor**: per-scheduler posted tasks and timers, polled by workers
//!
//! ## Quick Start
//!
//! ```ignore
//! use skein::{this_fiber, Scheduler};
//! use std::time::Duration;
//!
//! fn main() -> skein::FiberResult<()> {
//!     let sched = Scheduler::instance();
//!     sched.start(2)?;
//!
//!     let mut fiber = skein::spawn(|| {
//!         this_fiber::set_name("greeter").unwrap();
//!         this_fiber::sleep_for(Duration::from_millis(10)).unwrap();
//!         println!("hello from fiber {}", this_fiber::id());
//!     });
//!     fiber.join(true)?;
//!
//!     sched.join()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │        spawn(), Builder, Fiber::join/detach, this_fiber     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Scheduler                              │
//! │   shared ready-queue, per-worker pinned queues, reactor     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │  Worker   │      │  Worker   │      │  Worker   │
//!    │  Thread   │      │  Thread   │      │  Thread   │
//!    └───────────┘      └───────────┘      └───────────┘
//!          │                   │                   │
//!          └───────────────────┼───────────────────┘
//!                              ▼
//!    ┌─────────────────────────────────────────────────────────┐
//!    │             Execution contexts (fiber stacks)           │
//!    └─────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use skein_core::{
    FiberError,
    FiberId,
    FiberPanic,
    FiberResult,
    FiberState,
    SchedulingPolicy,
    SuspendReason,
    NOT_A_FIBER,
};

// Re-export kprint macros for debug logging
pub use skein_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use skein_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled, set_time_enabled};

// Re-export env utilities
pub use skein_core::{env_flag, env_get, env_get_opt, env_millis};

// Re-export runtime types
pub use skein_runtime::{
    Builder,
    ContextFactory,
    CoroutineFactory,
    ExecutionContext,
    Fiber,
    FiberAttributes,
    Reactor,
    Scheduler,
    SchedulerConfig,
    TimerHandle,
};
pub use skein_runtime::this_fiber;

/// Spawn a fiber on the default scheduler
///
/// The default is the calling worker's scheduler when called from fiber
/// code, `Scheduler::instance()` otherwise.
///
/// # Panics
///
/// Panics if the fiber's stack cannot be allocated, like
/// `std::thread::spawn`. Use [`Builder::spawn`] to handle that error.
pub fn spawn<F>(f: F) -> Fiber
where
    F: FnOnce() + Send + 'static,
{
    match Builder::new().spawn(f) {
        Ok(fiber) => fiber,
        Err(e) => panic!("failed to spawn fiber: {}", e),
    }
}

/// Spawn a fiber with explicit attributes on `scheduler`
pub fn spawn_with<F>(
    scheduler: &Scheduler,
    attributes: FiberAttributes,
    f: F,
) -> FiberResult<Fiber>
where
    F: FnOnce() + Send + 'static,
{
    Builder::new()
        .scheduler(scheduler)
        .attributes(attributes)
        .spawn(f)
}

/// Number of hardware threads available, at least 1
pub fn hardware_concurrency() -> usize {
    skein_runtime::hardware_threads()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_concurrency() {
        assert!(hardware_concurrency() >= 1);
    }

    #[test]
    fn test_spawn_with() {
        let sched = Scheduler::new(SchedulerConfig::new().num_workers(1)).unwrap();
        sched.start(1).unwrap();
        let mut fiber = spawn_with(&sched, FiberAttributes::NORMAL, || {
            assert!(this_fiber::is_a_fiber());
        })
        .unwrap();
        fiber.join(true).unwrap();
        sched.join().unwrap();
    }
}
