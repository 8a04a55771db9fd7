//! Thread-local storage for worker and fiber context
//!
//! A normal fiber may be resumed on a different OS thread than the one it
//! suspended on. Every accessor here is `#[inline(never)]` so the TLS address
//! is recomputed on each call instead of being cached in a register across a
//! context switch.

use std::cell::RefCell;
use std::sync::Arc;

use crate::fiber::FiberObject;
use crate::scheduler::SchedulerInner;

struct WorkerContext {
    scheduler: Arc<SchedulerInner>,
    index: usize,
}

thread_local! {
    /// Set for the lifetime of a worker thread's run loop
    static WORKER: RefCell<Option<WorkerContext>> = const { RefCell::new(None) };

    /// Fiber currently resumed on this OS thread
    static CURRENT_FIBER: RefCell<Option<Arc<FiberObject>>> = const { RefCell::new(None) };
}

/// Mark this OS thread as worker `index` of `scheduler`
#[inline(never)]
pub(crate) fn set_worker(scheduler: Arc<SchedulerInner>, index: usize) {
    WORKER.with(|w| *w.borrow_mut() = Some(WorkerContext { scheduler, index }));
}

#[inline(never)]
pub(crate) fn clear_worker() {
    // Take first so the Arc drops outside the borrow
    let ctx = WORKER.with(|w| w.borrow_mut().take());
    drop(ctx);
}

/// Scheduler and worker index, if this thread is a worker
#[inline(never)]
pub(crate) fn current_worker() -> Option<(Arc<SchedulerInner>, usize)> {
    WORKER.with(|w| {
        w.borrow()
            .as_ref()
            .map(|ctx| (Arc::clone(&ctx.scheduler), ctx.index))
    })
}

/// Worker index, if this thread is a worker
#[inline(never)]
pub(crate) fn worker_index() -> Option<usize> {
    WORKER.with(|w| w.borrow().as_ref().map(|ctx| ctx.index))
}

#[inline(never)]
pub(crate) fn set_current_fiber(fiber: Arc<FiberObject>) {
    CURRENT_FIBER.with(|f| *f.borrow_mut() = Some(fiber));
}

#[inline(never)]
pub(crate) fn clear_current_fiber() -> Option<Arc<FiberObject>> {
    CURRENT_FIBER.with(|f| f.borrow_mut().take())
}

/// Fiber running on this OS thread
#[inline(never)]
pub(crate) fn current_fiber() -> Option<Arc<FiberObject>> {
    CURRENT_FIBER.with(|f| f.borrow().clone())
}

/// Check if we're running inside a fiber
#[inline(never)]
pub(crate) fn in_fiber() -> bool {
    CURRENT_FIBER.with(|f| f.borrow().is_some())
}
