//! Error types for the skein scheduler

use core::fmt;
use std::any::Any;

use thiserror::Error;

use crate::id::FiberId;

/// Result type for scheduler and fiber operations
pub type FiberResult<T> = Result<T, FiberError>;

/// Errors that can occur in scheduler and fiber operations
#[derive(Debug, Error)]
pub enum FiberError {
    /// join/detach/naming on an empty, joined or detached handle
    #[error("fiber handle is not joinable")]
    InvalidFiber,

    /// A fiber tried to join its own handle
    #[error("fiber attempted to join itself")]
    SelfJoin,

    /// The join would close a cycle of fibers waiting on each other
    #[error("joining fiber {target} would deadlock")]
    Deadlock { target: FiberId },

    /// A `this_fiber` primitive was called off-fiber
    #[error("not running inside a fiber")]
    NotAFiber,

    /// The fiber's callable panicked; surfaced by `join(true)`
    #[error("fiber panicked: {0}")]
    Panicked(FiberPanic),

    /// Stack or OS thread creation failed
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// `start` called on a pool with a different size
    #[error("scheduler already running {running} worker(s), cannot start {requested}")]
    AlreadyStarted { running: usize, requested: usize },

    /// Configuration rejected by `validate()`
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// `reset_instance` while the default scheduler is still referenced
    #[error("default scheduler is still referenced")]
    InstanceInUse,

    /// `Scheduler::join` from a fiber or worker of that scheduler
    #[error("scheduler join called from one of its own workers")]
    JoinFromFiber,
}

impl FiberError {
    /// Check if this error carries a captured panic
    #[inline]
    pub fn is_panic(&self) -> bool {
        matches!(self, FiberError::Panicked(_))
    }
}

/// A panic captured from a fiber's callable
///
/// Owns the original payload so the joiner can re-raise it with
/// [`FiberPanic::resume`].
pub struct FiberPanic {
    message: String,
    payload: Box<dyn Any + Send + 'static>,
}

// Safety: the payload is only reachable through `self` by value
// (`into_payload`, `resume`), never through `&FiberPanic`.
unsafe impl Sync for FiberPanic {}

impl FiberPanic {
    /// Wrap a payload returned by `std::panic::catch_unwind`
    pub fn from_payload(payload: Box<dyn Any + Send + 'static>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        Self { message, payload }
    }

    /// Best-effort panic message
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Take the original payload
    pub fn into_payload(self) -> Box<dyn Any + Send + 'static> {
        self.payload
    }

    /// Re-raise the panic on the calling thread
    pub fn resume(self) -> ! {
        std::panic::resume_unwind(self.payload)
    }
}

impl fmt::Debug for FiberPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberPanic")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for FiberPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(FiberError::NotAFiber.to_string(), "not running inside a fiber");

        let e = FiberError::AlreadyStarted { running: 2, requested: 4 };
        assert_eq!(
            e.to_string(),
            "scheduler already running 2 worker(s), cannot start 4"
        );

        let e = FiberError::Deadlock { target: FiberId::from_raw(9) };
        assert_eq!(e.to_string(), "joining fiber 9 would deadlock");
    }

    #[test]
    fn test_panic_message_extraction() {
        let p = FiberPanic::from_payload(Box::new("boom"));
        assert_eq!(p.message(), "boom");

        let p = FiberPanic::from_payload(Box::new(String::from("kaput")));
        assert_eq!(p.message(), "kaput");

        let p = FiberPanic::from_payload(Box::new(42u32));
        assert_eq!(p.message(), "Box<dyn Any>");
        assert_eq!(*p.into_payload().downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn test_panicked_variant() {
        let e = FiberError::Panicked(FiberPanic::from_payload(Box::new("bad")));
        assert!(e.is_panic());
        assert_eq!(e.to_string(), "fiber panicked: bad");
        assert!(!FiberError::SelfJoin.is_panic());
    }

    #[test]
    fn test_resume_reraises_payload() {
        let p = FiberPanic::from_payload(Box::new("again"));
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| p.resume()));
        let payload = caught.unwrap_err();
        assert_eq!(*payload.downcast::<&'static str>().unwrap(), "again");
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_error_is_send_sync() {
        assert_send_sync::<FiberError>();
    }
}
