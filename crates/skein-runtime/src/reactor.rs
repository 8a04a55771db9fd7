//! Per-scheduler reactor
//!
//! Holds work that is not a fiber: posted closures and one-shot timers.
//! Every worker polls it between fibers, so callbacks run on worker threads
//! but never on a fiber stack.
//!
//! ```text
//!   post(f) ──────► tasks (SegQueue) ──┐
//!                                      ├──► poll(now) on any worker
//!   add_timer(t, f) ► timers (heap) ───┘
//!          │
//!          └── waker: unpark one idle worker
//! ```
//!
//! Sleeping fibers are parked here as timers whose callback puts the fiber
//! back on a ready-queue.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use skein_core::{kerror, ktrace, FiberPanic};

use crate::timer::{TimerHandle, TimerQueue};

/// Closure posted to the reactor
pub type Task = Box<dyn FnOnce() + Send + 'static>;

type Waker = Box<dyn Fn() + Send + Sync + 'static>;

struct ReactorInner {
    tasks: SegQueue<Task>,
    timers: Mutex<TimerQueue>,
    /// Posted tasks and live timers not yet run to completion
    outstanding: AtomicUsize,
    waker: Option<Waker>,
}

/// Shared handle to a reactor
///
/// Cloning is cheap; all clones refer to the same queues.
#[derive(Clone)]
pub struct Reactor {
    inner: Arc<ReactorInner>,
}

impl Reactor {
    /// Standalone reactor; the owner drives it with [`poll`](Self::poll)
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Reactor that calls `waker` whenever new work arrives
    pub(crate) fn with_waker<W>(waker: W) -> Self
    where
        W: Fn() + Send + Sync + 'static,
    {
        Self::build(Some(Box::new(waker)))
    }

    fn build(waker: Option<Waker>) -> Self {
        Self {
            inner: Arc::new(ReactorInner {
                tasks: SegQueue::new(),
                timers: Mutex::new(TimerQueue::new()),
                outstanding: AtomicUsize::new(0),
                waker,
            }),
        }
    }

    #[inline]
    fn wake(&self) {
        if let Some(waker) = &self.inner.waker {
            waker();
        }
    }

    /// Run `f` on a worker thread at the next poll
    pub fn post<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        self.inner.tasks.push(Box::new(f));
        self.wake();
    }

    /// Run `f` at the first poll at or after `deadline`
    pub fn add_timer<F>(&self, deadline: Instant, f: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        let handle = self.inner.timers.lock().insert(deadline, Box::new(f));
        ktrace!("timer {} armed", handle.raw());
        self.wake();
        handle
    }

    /// Run `f` once `delay` has elapsed
    pub fn add_timer_after<F>(&self, delay: Duration, f: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.add_timer(Instant::now() + delay, f)
    }

    /// Cancel a timer that has not fired yet
    pub fn cancel_timer(&self, handle: TimerHandle) -> bool {
        let cancelled = self.inner.timers.lock().cancel(handle);
        if cancelled {
            self.inner.outstanding.fetch_sub(1, Ordering::AcqRel);
        }
        cancelled
    }

    /// Run posted tasks and timers due at `now`
    ///
    /// Tasks posted while polling wait for the next poll. Returns the number
    /// of callbacks run. A panicking callback is logged and swallowed.
    pub fn poll(&self, now: Instant) -> usize {
        let mut ran = 0;

        let batch = self.inner.tasks.len();
        for _ in 0..batch {
            let Some(task) = self.inner.tasks.pop() else { break };
            self.run(task);
            ran += 1;
        }

        let expired = {
            let mut timers = self.inner.timers.lock();
            if timers.is_empty() {
                Vec::new()
            } else {
                timers.pop_expired(now)
            }
        };
        for callback in expired {
            self.run(callback);
            ran += 1;
        }

        ran
    }

    fn run(&self, task: Task) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            let panic = FiberPanic::from_payload(payload);
            kerror!("reactor callback panicked: {}", panic.message());
        }
        self.inner.outstanding.fetch_sub(1, Ordering::AcqRel);
    }

    /// Earliest pending timer deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.timers.lock().next_deadline()
    }

    /// Posted tasks and timers that have not finished running
    #[inline]
    pub fn pending(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Check if there is a posted task ready to run right now
    #[inline]
    pub(crate) fn has_tasks(&self) -> bool {
        !self.inner.tasks.is_empty()
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("tasks", &self.inner.tasks.len())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_post_and_poll() {
        let reactor = Reactor::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let h = hits.clone();
            reactor.post(move || {
                h.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(reactor.pending(), 3);
        assert_eq!(reactor.poll(Instant::now()), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(reactor.pending(), 0);
    }

    #[test]
    fn test_task_posted_while_polling_waits() {
        let reactor = Reactor::new();
        let r = reactor.clone();
        let inner_ran = Arc::new(AtomicBool::new(false));
        let flag = inner_ran.clone();
        reactor.post(move || {
            r.post(move || flag.store(true, Ordering::SeqCst));
        });

        assert_eq!(reactor.poll(Instant::now()), 1);
        assert!(!inner_ran.load(Ordering::SeqCst));
        assert_eq!(reactor.poll(Instant::now()), 1);
        assert!(inner_ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_timers() {
        let reactor = Reactor::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let base = Instant::now();

        let f = fired.clone();
        reactor.add_timer(base + Duration::from_millis(10), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let f = fired.clone();
        let cancelled = reactor.add_timer(base + Duration::from_millis(5), move || {
            f.fetch_add(100, Ordering::SeqCst);
        });

        assert_eq!(reactor.pending(), 2);
        assert!(reactor.cancel_timer(cancelled));
        assert_eq!(reactor.pending(), 1);
        assert_eq!(reactor.next_deadline(), Some(base + Duration::from_millis(10)));

        assert_eq!(reactor.poll(base), 0);
        assert_eq!(reactor.poll(base + Duration::from_millis(10)), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(reactor.pending(), 0);
        assert_eq!(reactor.next_deadline(), None);
    }

    #[test]
    fn test_panicking_task_is_contained() {
        skein_core::kprint::set_log_level(skein_core::kprint::LogLevel::Off);
        let reactor = Reactor::new();
        reactor.post(|| panic!("boom"));
        let ok = Arc::new(AtomicBool::new(false));
        let o = ok.clone();
        reactor.post(move || o.store(true, Ordering::SeqCst));

        assert_eq!(reactor.poll(Instant::now()), 2);
        assert!(ok.load(Ordering::SeqCst));
        assert_eq!(reactor.pending(), 0);
    }

    #[test]
    fn test_waker_called() {
        let wakes = Arc::new(AtomicUsize::new(0));
        let w = wakes.clone();
        let reactor = Reactor::with_waker(move || {
            w.fetch_add(1, Ordering::SeqCst);
        });
        reactor.post(|| {});
        reactor.add_timer_after(Duration::from_secs(60), || {});
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
    }
}
