//! Scheduler configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (`from_env()`)
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use skein_runtime::SchedulerConfig;
//!
//! let config = SchedulerConfig::from_env()
//!     .num_workers(8)
//!     .stack_size(512 * 1024);
//! ```

use std::time::Duration;

use skein_core::constants::{MAX_WORKERS, MIN_STACK_SIZE};
use skein_core::env::{env_flag, env_get, env_millis};
use skein_core::{kprintln, FiberError, FiberResult};

/// Library defaults
pub mod defaults {
    /// Workers started by `Scheduler::start_default()`; 0 = hardware threads
    pub const NUM_WORKERS: usize = 0;
    pub const MAX_WORKERS: usize = skein_core::constants::MAX_WORKERS;
    pub const STACK_SIZE: usize = skein_core::constants::DEFAULT_STACK_SIZE;
    pub const IDLE_SPINS: u32 = 10;
    pub const PARK_TIMEOUT_MS: u64 = 50;
    pub const SHARED_CHECK_INTERVAL: u32 = skein_core::constants::SHARED_CHECK_INTERVAL;
    pub const DEBUG_LOGGING: bool = false;
}

/// Scheduler configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pool size used by `start_default()`
    pub num_workers: usize,
    /// Hard cap on the pool, `add_worker_thread` included
    pub max_workers: usize,
    /// Stack size given to each fiber unless the builder overrides it
    pub stack_size: usize,
    /// Empty polls before an idle worker parks
    pub idle_spins: u32,
    /// Longest a parked worker sleeps before re-checking its queues
    pub park_timeout: Duration,
    /// Poll the shared queue first every N dequeues
    pub shared_check_interval: u32,
    /// Log worker and fiber lifecycle at info level
    pub debug_logging: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Number of hardware threads, at least 1
pub fn hardware_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl SchedulerConfig {
    /// Create config from library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `SKEIN_NUM_WORKERS` - Pool size for `start_default()`
    /// - `SKEIN_MAX_WORKERS` - Pool size cap
    /// - `SKEIN_STACK_SIZE` - Fiber stack size in bytes
    /// - `SKEIN_IDLE_SPINS` - Spins before parking
    /// - `SKEIN_PARK_TIMEOUT_MS` - Park timeout in milliseconds
    /// - `SKEIN_SHARED_CHECK_INTERVAL` - Shared-queue fairness interval
    /// - `SKEIN_DEBUG` - Lifecycle logging (0/1)
    pub fn from_env() -> Self {
        let base = Self::new();
        let num_workers = env_get("SKEIN_NUM_WORKERS", defaults::NUM_WORKERS);
        Self {
            num_workers: if num_workers == 0 { base.num_workers } else { num_workers },
            max_workers: env_get("SKEIN_MAX_WORKERS", base.max_workers),
            stack_size: env_get("SKEIN_STACK_SIZE", base.stack_size),
            idle_spins: env_get("SKEIN_IDLE_SPINS", base.idle_spins),
            park_timeout: env_millis("SKEIN_PARK_TIMEOUT_MS", defaults::PARK_TIMEOUT_MS),
            shared_check_interval: env_get(
                "SKEIN_SHARED_CHECK_INTERVAL",
                base.shared_check_interval,
            ),
            debug_logging: env_flag("SKEIN_DEBUG", base.debug_logging),
        }
    }

    /// Create config with library defaults only (no env override).
    pub fn new() -> Self {
        Self {
            num_workers: if defaults::NUM_WORKERS == 0 {
                hardware_threads().min(defaults::MAX_WORKERS)
            } else {
                defaults::NUM_WORKERS
            },
            max_workers: defaults::MAX_WORKERS,
            stack_size: defaults::STACK_SIZE,
            idle_spins: defaults::IDLE_SPINS,
            park_timeout: Duration::from_millis(defaults::PARK_TIMEOUT_MS),
            shared_check_interval: defaults::SHARED_CHECK_INTERVAL,
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    // Builder methods

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.max_workers = n;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn idle_spins(mut self, spins: u32) -> Self {
        self.idle_spins = spins;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    pub fn shared_check_interval(mut self, n: u32) -> Self {
        self.shared_check_interval = n;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> FiberResult<()> {
        if self.num_workers == 0 {
            return Err(FiberError::InvalidConfig("num_workers must be > 0".into()));
        }
        if self.max_workers == 0 || self.max_workers > MAX_WORKERS {
            return Err(FiberError::InvalidConfig(format!(
                "max_workers must be in 1..={}",
                MAX_WORKERS
            )));
        }
        if self.num_workers > self.max_workers {
            return Err(FiberError::InvalidConfig("num_workers must be <= max_workers".into()));
        }
        if self.stack_size < MIN_STACK_SIZE {
            return Err(FiberError::InvalidConfig(format!(
                "stack_size must be >= {} bytes",
                MIN_STACK_SIZE
            )));
        }
        if self.park_timeout.is_zero() {
            return Err(FiberError::InvalidConfig("park_timeout must be > 0".into()));
        }
        if self.shared_check_interval == 0 {
            return Err(FiberError::InvalidConfig(
                "shared_check_interval must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        kprintln!("skein configuration:");
        kprintln!("  num_workers:            {}", self.num_workers);
        kprintln!("  max_workers:            {}", self.max_workers);
        kprintln!("  stack_size:             {}", self.stack_size);
        kprintln!("  idle_spins:             {}", self.idle_spins);
        kprintln!("  park_timeout:           {:?}", self.park_timeout);
        kprintln!("  shared_check_interval:  {}", self.shared_check_interval);
        kprintln!("  debug_logging:          {}", self.debug_logging);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SchedulerConfig::new();
        assert!(config.num_workers >= 1);
        assert_eq!(config.stack_size, defaults::STACK_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SchedulerConfig::new()
            .num_workers(8)
            .stack_size(64 * 1024)
            .park_timeout(Duration::from_millis(5))
            .debug_logging(true);

        assert_eq!(config.num_workers, 8);
        assert_eq!(config.stack_size, 64 * 1024);
        assert_eq!(config.park_timeout, Duration::from_millis(5));
        assert!(config.debug_logging);
    }

    #[test]
    fn test_validation() {
        assert!(SchedulerConfig::new().num_workers(0).validate().is_err());
        assert!(SchedulerConfig::new().num_workers(1000).validate().is_err());
        assert!(SchedulerConfig::new().stack_size(1024).validate().is_err());
        assert!(SchedulerConfig::new().shared_check_interval(0).validate().is_err());
        assert!(SchedulerConfig::new()
            .park_timeout(Duration::ZERO)
            .validate()
            .is_err());

        let err = SchedulerConfig::new().num_workers(4).max_workers(2).validate();
        assert!(matches!(err, Err(FiberError::InvalidConfig(_))));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("SKEIN_IDLE_SPINS", "3");
        let config = SchedulerConfig::from_env();
        std::env::remove_var("SKEIN_IDLE_SPINS");
        assert_eq!(config.idle_spins, 3);
    }
}
