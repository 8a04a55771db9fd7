//! # skein-runtime
//!
//! The engine behind the skein fiber scheduler.
//!
//! This crate provides:
//! - Execution contexts (corosensei stackful coroutines behind a trait)
//! - A per-scheduler reactor with posted tasks and timers
//! - Worker threads with local and shared ready-queues, and parking
//! - The fiber object and its state machine
//! - `Scheduler` (explicit instances plus a process-wide default)
//! - `Fiber` handles, `Builder`, and the `this_fiber` operations

pub mod config;
pub mod context;
pub mod timer;
pub mod reactor;
pub mod parking;
pub mod scheduler;
pub mod handle;
pub mod this_fiber;

mod fiber;
mod tls;
mod worker;

// Re-exports
pub use config::{hardware_threads, SchedulerConfig};
pub use context::{
    ContextBody, ContextFactory, ContextStatus, CoroutineFactory, ExecutionContext, Suspend,
};
pub use handle::{Builder, Fiber, FiberAttributes};
pub use reactor::{Reactor, Task};
pub use scheduler::Scheduler;
pub use timer::TimerHandle;
