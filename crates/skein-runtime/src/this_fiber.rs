//! Operations on the fiber running on the calling OS thread
//!
//! Everything except [`id`], [`is_a_fiber`] and [`worker_index`] fails with
//! `FiberError::NotAFiber` when called from plain thread code.

use std::sync::Arc;
use std::time::{Duration, Instant};

use skein_core::{FiberError, FiberId, FiberResult};

use crate::fiber::{FiberObject, Suspension};
use crate::reactor::Reactor;
use crate::scheduler::Scheduler;
use crate::tls;

fn current() -> FiberResult<Arc<FiberObject>> {
    tls::current_fiber().ok_or(FiberError::NotAFiber)
}

/// Give up the worker; the fiber goes to the back of its ready-queue
pub fn yield_now() -> FiberResult<()> {
    current()?.suspend(Suspension::Yield)
}

/// Suspend for at least `duration`
///
/// Durations under a microsecond are a plain yield.
pub fn sleep_for(duration: Duration) -> FiberResult<()> {
    if duration < Duration::from_micros(1) {
        return yield_now();
    }
    sleep_until(Instant::now() + duration)
}

/// Suspend until `deadline`; a deadline already passed is a plain yield
pub fn sleep_until(deadline: Instant) -> FiberResult<()> {
    let fiber = current()?;
    if deadline.saturating_duration_since(Instant::now()) < Duration::from_micros(1) {
        return fiber.suspend(Suspension::Yield);
    }
    fiber.suspend(Suspension::Sleep(deadline))
}

/// Id of the running fiber, `FiberId::NONE` off-fiber
pub fn id() -> FiberId {
    tls::current_fiber().map_or(FiberId::NONE, |f| f.id())
}

pub fn is_a_fiber() -> bool {
    tls::in_fiber()
}

pub fn name() -> FiberResult<String> {
    Ok(current()?.name())
}

pub fn set_name(name: &str) -> FiberResult<()> {
    current()?.set_name(name);
    Ok(())
}

/// Event loop of the scheduler running this fiber
pub fn reactor() -> FiberResult<Reactor> {
    Ok(scheduler()?.reactor())
}

/// Scheduler running this fiber
pub fn scheduler() -> FiberResult<Scheduler> {
    let fiber = current()?;
    fiber
        .scheduler()
        .map(Scheduler::from_inner)
        .ok_or(FiberError::NotAFiber)
}

/// Index of the worker thread the caller runs on, if it is a worker
///
/// For a normal fiber this may change across suspension points.
pub fn worker_index() -> Option<usize> {
    tls::worker_index()
}
