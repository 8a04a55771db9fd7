//! Execution contexts
//!
//! A context is one resumable stackful computation. The scheduler only sees
//! the [`ExecutionContext`] / [`ContextFactory`] traits; the default
//! implementation wraps a `corosensei` coroutine on a guarded `DefaultStack`.
//!
//! ```text
//!   worker loop                       fiber stack
//!   ───────────                       ───────────
//!   ctx.resume()  ───────────────►    body(&dyn Suspend)
//!                                         ...
//!                 ◄───────────────    suspend.switch_out()
//!   ContextStatus::Suspended
//!   ctx.resume()  ───────────────►    (returns from switch_out)
//!                 ◄───────────────    body returns
//!   ContextStatus::Finished
//! ```

use std::mem::ManuallyDrop;

use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};
use skein_core::{kwarn, FiberError, FiberResult};

/// Handle the running body uses to give control back to its resumer
pub trait Suspend {
    /// Switch back to whoever called `resume()`.
    /// Returns when the context is resumed again.
    fn switch_out(&self);
}

/// Code run on a fresh context
pub type ContextBody = Box<dyn FnOnce(&dyn Suspend) + Send + 'static>;

/// Result of one `resume()` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStatus {
    /// The body called `switch_out()`
    Suspended,
    /// The body returned
    Finished,
}

/// A resumable stackful computation
///
/// `Send` because normal fibers may be resumed by a different worker than
/// the one that last suspended them.
pub trait ExecutionContext: Send {
    /// Run the body until it suspends or returns
    fn resume(&mut self) -> ContextStatus;

    /// Check if the body has returned
    fn is_finished(&self) -> bool;
}

/// Creates contexts for new fibers
pub trait ContextFactory: Send + Sync + 'static {
    /// Allocate a stack of at least `stack_size` bytes and prepare `body` on it
    fn create(&self, stack_size: usize, body: ContextBody) -> FiberResult<Box<dyn ExecutionContext>>;

    /// Backend name for logging
    fn name(&self) -> &'static str {
        "unknown"
    }
}

// ============================================================================
// corosensei backend
// ============================================================================

impl Suspend for Yielder<(), ()> {
    #[inline]
    fn switch_out(&self) {
        Yielder::suspend(self, ());
    }
}

/// Default factory: corosensei coroutines on mmap'd stacks with guard pages
#[derive(Debug, Default, Clone, Copy)]
pub struct CoroutineFactory;

impl ContextFactory for CoroutineFactory {
    fn create(&self, stack_size: usize, body: ContextBody) -> FiberResult<Box<dyn ExecutionContext>> {
        let stack = DefaultStack::new(stack_size).map_err(|e| {
            FiberError::ResourceExhaustion(format!("fiber stack of {} bytes: {}", stack_size, e))
        })?;
        let coroutine = Coroutine::with_stack(stack, move |yielder: &Yielder<(), ()>, ()| {
            body(yielder);
        });
        Ok(Box::new(CoroutineContext {
            coroutine: ManuallyDrop::new(coroutine),
        }))
    }

    fn name(&self) -> &'static str {
        "corosensei"
    }
}

struct CoroutineContext {
    coroutine: ManuallyDrop<Coroutine<(), (), (), DefaultStack>>,
}

// Safety: the coroutine is only ever driven by one worker at a time (the
// fiber object hands the context out by value). Moving a suspended stack
// between threads is sound as long as the body holds no thread-local
// references across `switch_out`, which the runtime's TLS accessors
// guarantee by never being inlined into fiber code.
unsafe impl Send for CoroutineContext {}

impl ExecutionContext for CoroutineContext {
    fn resume(&mut self) -> ContextStatus {
        match self.coroutine.resume(()) {
            CoroutineResult::Yield(()) => ContextStatus::Suspended,
            CoroutineResult::Return(()) => ContextStatus::Finished,
        }
    }

    #[inline]
    fn is_finished(&self) -> bool {
        self.coroutine.done()
    }
}

impl Drop for CoroutineContext {
    fn drop(&mut self) {
        if self.coroutine.done() || !self.coroutine.started() {
            // Safety: dropped exactly once, here.
            unsafe { ManuallyDrop::drop(&mut self.coroutine) };
        } else {
            // Force-unwinding would run the body's catch_unwind on a foreign
            // resumer; leak the stack instead.
            kwarn!("leaking stack of a suspended fiber context");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_resume_until_finished() {
        let steps = Arc::new(AtomicUsize::new(0));
        let s = steps.clone();
        let mut ctx = CoroutineFactory
            .create(64 * 1024, Box::new(move |suspend: &dyn Suspend| {
                s.fetch_add(1, Ordering::SeqCst);
                suspend.switch_out();
                s.fetch_add(1, Ordering::SeqCst);
                suspend.switch_out();
                s.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        assert!(!ctx.is_finished());
        assert_eq!(ctx.resume(), ContextStatus::Suspended);
        assert_eq!(steps.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.resume(), ContextStatus::Suspended);
        assert_eq!(steps.load(Ordering::SeqCst), 2);
        assert_eq!(ctx.resume(), ContextStatus::Finished);
        assert_eq!(steps.load(Ordering::SeqCst), 3);
        assert!(ctx.is_finished());
    }

    #[test]
    fn test_resume_on_another_thread() {
        let mut ctx = CoroutineFactory
            .create(64 * 1024, Box::new(|suspend: &dyn Suspend| {
                suspend.switch_out();
            }))
            .unwrap();
        assert_eq!(ctx.resume(), ContextStatus::Suspended);

        let status = std::thread::spawn(move || ctx.resume()).join().unwrap();
        assert_eq!(status, ContextStatus::Finished);
    }

    #[test]
    fn test_unstarted_context_drops_body() {
        let marker = Arc::new(());
        let held = marker.clone();
        let ctx = CoroutineFactory
            .create(64 * 1024, Box::new(move |_: &dyn Suspend| drop(held)))
            .unwrap();
        assert_eq!(Arc::strong_count(&marker), 2);
        drop(ctx);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_factory_name() {
        assert_eq!(CoroutineFactory.name(), "corosensei");
    }
}
