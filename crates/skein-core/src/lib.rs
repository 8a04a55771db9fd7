//! # skein-core
//!
//! Core types for the skein fiber scheduler.
//!
//! This crate is platform-agnostic and holds no scheduling logic.
//! The engine lives in `skein-runtime`.
//!
//! ## Modules
//!
//! - `id` - Fiber identifier type
//! - `state` - Fiber state machine and scheduling policy
//! - `error` - Error taxonomy and captured panics
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::{FiberId, NOT_A_FIBER};
pub use state::{FiberState, SchedulingPolicy, SuspendReason};
pub use error::{FiberError, FiberPanic, FiberResult};
pub use env::{env_flag, env_get, env_get_opt, env_millis};

/// Runtime-wide constants
pub mod constants {
    /// Default fiber stack size (256 KB, guard page added by the stack allocator)
    pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

    /// Smallest stack a fiber may request
    pub const MIN_STACK_SIZE: usize = 16 * 1024;

    /// Upper bound on worker threads per scheduler
    pub const MAX_WORKERS: usize = 256;

    /// Poll the shared queue first every N dequeues (Go uses 61)
    pub const SHARED_CHECK_INTERVAL: u32 = 61;

    /// Sentinel for "no worker"
    pub const NO_WORKER: usize = usize::MAX;
}
