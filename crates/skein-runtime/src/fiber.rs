//! Fiber object: the scheduler-side record of one fiber
//!
//! Shared (`Arc`) between the user's handle, ready-queues, timers and join
//! waiters. Every state change goes through the one mutex in
//! [`FiberObject`], so `Finished` and a concurrently arriving joiner cannot
//! miss each other.
//!
//! ```text
//!   Created ──► Ready ──► Running ──► Finished
//!                 ▲          │
//!                 │          ▼
//!                 └──── Suspended{Yielded|Sleeping|WaitingJoin}
//! ```
//!
//! A fiber never re-queues itself. It records a [`Suspension`] and switches
//! out; the worker that resumed it acts on the suspension only after the
//! context is fully saved, so another worker can never resume a half-switched
//! stack.

use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{const_mutex, Condvar, Mutex};
use skein_core::constants::NO_WORKER;
use skein_core::{
    kdebug, kerror, kwarn, FiberError, FiberId, FiberPanic, FiberResult, FiberState,
    SchedulingPolicy, SuspendReason,
};

use crate::context::{ContextBody, ExecutionContext, Suspend};
use crate::scheduler::SchedulerInner;
use crate::tls;

/// The user's callable, consumed once on first resume
pub(crate) type FiberData = Box<dyn FnOnce() + Send + 'static>;

/// Serializes join-cycle checks across all schedulers
static JOIN_GRAPH: Mutex<()> = const_mutex(());

/// What a fiber asked for when it switched out
pub(crate) enum Suspension {
    Yield,
    Sleep(Instant),
    Join(Arc<FiberObject>),
}

impl Suspension {
    fn reason(&self) -> SuspendReason {
        match self {
            Suspension::Yield => SuspendReason::Yielded,
            Suspension::Sleep(_) => SuspendReason::Sleeping,
            Suspension::Join(_) => SuspendReason::WaitingJoin,
        }
    }
}

/// Pointer to the running body's `Suspend` handle
///
/// Lives on the fiber's own stack, so it stays valid (and at the same
/// address) until the body returns, even if the stack migrates.
struct SuspenderPtr(NonNull<dyn Suspend>);

// Safety: only dereferenced by the fiber itself while it is running.
unsafe impl Send for SuspenderPtr {}

struct FiberInner {
    state: FiberState,
    name: String,
    /// Present while the fiber is not running
    context: Option<Box<dyn ExecutionContext>>,
    suspender: Option<SuspenderPtr>,
    pending: Option<Suspension>,
    joiners: Vec<Arc<FiberObject>>,
    /// Fiber this one is blocked joining, for cycle detection
    joining: Option<Arc<FiberObject>>,
    outcome: Option<Result<(), FiberPanic>>,
    detached: bool,
    /// Worker that last resumed the fiber
    last_worker: usize,
}

pub struct FiberObject {
    id: FiberId,
    policy: SchedulingPolicy,
    /// Pinned worker, `NO_WORKER` while the fiber may migrate. Set once:
    /// at spawn for stick-with-parent fibers, or when the fiber spawns its
    /// first stick-with-parent child.
    home: AtomicUsize,
    scheduler: Weak<SchedulerInner>,
    inner: Mutex<FiberInner>,
    finished: Condvar,
}

impl FiberObject {
    pub(crate) fn new(
        name: String,
        policy: SchedulingPolicy,
        home: Option<usize>,
        scheduler: Weak<SchedulerInner>,
        context: Box<dyn ExecutionContext>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: FiberId::next(),
            policy,
            home: AtomicUsize::new(home.unwrap_or(NO_WORKER)),
            scheduler,
            inner: Mutex::new(FiberInner {
                state: FiberState::Created,
                name,
                context: Some(context),
                suspender: None,
                pending: None,
                joiners: Vec::new(),
                joining: None,
                outcome: None,
                detached: false,
                last_worker: NO_WORKER,
            }),
            finished: Condvar::new(),
        })
    }

    #[inline]
    pub fn id(&self) -> FiberId {
        self.id
    }

    #[inline]
    pub fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    /// Worker this fiber is pinned to
    #[inline]
    pub fn home_worker(&self) -> Option<usize> {
        let home = self.home.load(Ordering::Acquire);
        (home != NO_WORKER).then_some(home)
    }

    /// Pin this fiber to `worker` unless it already has a home
    ///
    /// Returns the home in effect afterwards.
    pub(crate) fn pin_to(&self, worker: usize) -> usize {
        match self
            .home
            .compare_exchange(NO_WORKER, worker, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => worker,
            Err(home) => home,
        }
    }

    /// Worker that last resumed this fiber
    pub fn last_worker(&self) -> Option<usize> {
        let w = self.inner.lock().last_worker;
        (w != NO_WORKER).then_some(w)
    }

    pub(crate) fn scheduler(&self) -> Option<Arc<SchedulerInner>> {
        self.scheduler.upgrade()
    }

    pub fn state(&self) -> FiberState {
        self.inner.lock().state
    }

    pub fn is_finished(&self) -> bool {
        self.inner.lock().state.is_finished()
    }

    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    pub fn set_name(&self, name: &str) {
        let mut inner = self.inner.lock();
        inner.name.clear();
        inner.name.push_str(name);
    }

    fn transition(&self, inner: &mut FiberInner, next: FiberState) -> bool {
        if !inner.state.can_transition_to(next) {
            kerror!("fiber {}: illegal transition {} -> {}", self.id, inner.state, next);
            return false;
        }
        inner.state = next;
        true
    }

    // ========================================================================
    // Worker side
    // ========================================================================

    /// Created/Suspended -> Ready. False if the fiber is not in a state
    /// that may be queued.
    pub(crate) fn mark_ready(&self) -> bool {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, FiberState::Ready)
    }

    /// Ready -> Running; hands the context to the resuming worker
    pub(crate) fn begin_run(&self, worker: usize) -> Option<Box<dyn ExecutionContext>> {
        let mut inner = self.inner.lock();
        if !self.transition(&mut inner, FiberState::Running) {
            return None;
        }
        inner.last_worker = worker;
        inner.context.take()
    }

    /// Running -> Suspended; takes the context back and returns what the
    /// fiber asked for
    pub(crate) fn end_run(&self, context: Box<dyn ExecutionContext>) -> Suspension {
        let mut inner = self.inner.lock();
        inner.context = Some(context);
        let pending = inner.pending.take().unwrap_or(Suspension::Yield);
        self.transition(&mut inner, FiberState::Suspended(pending.reason()));
        pending
    }

    /// Running -> Finished; wakes thread joiners and returns fiber joiners
    pub(crate) fn finish(&self) -> Vec<Arc<FiberObject>> {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, FiberState::Finished);
        inner.context = None;
        inner.suspender = None;
        if inner.detached {
            log_detached_outcome(self.id, inner.outcome.take());
        }
        let joiners = std::mem::take(&mut inner.joiners);
        drop(inner);
        self.finished.notify_all();
        joiners
    }

    /// Queue `joiner` to be readied when this fiber finishes
    ///
    /// Returns false if already finished; the caller readies it instead.
    pub(crate) fn register_joiner(&self, joiner: Arc<FiberObject>) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.is_finished() {
            return false;
        }
        inner.joiners.push(joiner);
        true
    }

    // ========================================================================
    // Fiber side (called on the fiber's own stack)
    // ========================================================================

    fn install_suspender(&self, suspend: &dyn Suspend) {
        let ptr: NonNull<dyn Suspend + '_> = NonNull::from(suspend);
        // Safety: erases the borrow's lifetime. The referent outlives every
        // use because the pointer is cleared when the body returns.
        let ptr: NonNull<dyn Suspend + 'static> = unsafe { std::mem::transmute(ptr) };
        self.inner.lock().suspender = Some(SuspenderPtr(ptr));
    }

    fn complete(&self, outcome: Result<(), FiberPanic>) {
        let mut inner = self.inner.lock();
        inner.suspender = None;
        inner.outcome = Some(outcome);
    }

    /// Record `how` and switch back to the worker
    ///
    /// Returns once a worker resumes this fiber again.
    pub(crate) fn suspend(&self, how: Suspension) -> FiberResult<()> {
        let suspender = {
            let mut inner = self.inner.lock();
            let Some(ptr) = inner.suspender.as_ref().map(|s| s.0) else {
                return Err(FiberError::NotAFiber);
            };
            inner.pending = Some(how);
            ptr
        };
        // Safety: set by our own body, which is still running.
        unsafe { suspender.as_ref() }.switch_out();
        Ok(())
    }

    // ========================================================================
    // Handle side
    // ========================================================================

    /// Block the calling OS thread until the fiber finishes
    pub(crate) fn wait_finished(&self) {
        let mut inner = self.inner.lock();
        while !inner.state.is_finished() {
            self.finished.wait(&mut inner);
        }
    }

    pub(crate) fn take_outcome(&self) -> Option<Result<(), FiberPanic>> {
        self.inner.lock().outcome.take()
    }

    pub(crate) fn detach(&self) {
        let mut inner = self.inner.lock();
        inner.detached = true;
        if inner.state.is_finished() {
            log_detached_outcome(self.id, inner.outcome.take());
        }
    }

    /// Suspend the running fiber `self` until `target` finishes
    pub(crate) fn join_fiber(self: &Arc<Self>, target: &Arc<FiberObject>) -> FiberResult<()> {
        if Arc::ptr_eq(self, target) {
            return Err(FiberError::SelfJoin);
        }
        if target.is_finished() {
            return Ok(());
        }
        {
            let _graph = JOIN_GRAPH.lock();
            let mut cursor = Some(Arc::clone(target));
            while let Some(fiber) = cursor {
                if fiber.id == self.id {
                    return Err(FiberError::Deadlock { target: target.id });
                }
                cursor = fiber.inner.lock().joining.clone();
            }
            self.inner.lock().joining = Some(Arc::clone(target));
        }

        kdebug!("fiber {} waits for fiber {}", self.id, target.id);
        let result = self.suspend(Suspension::Join(Arc::clone(target)));

        let _graph = JOIN_GRAPH.lock();
        self.inner.lock().joining = None;
        result
    }
}

impl std::fmt::Debug for FiberObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("FiberObject")
            .field("id", &self.id)
            .field("name", &inner.name)
            .field("policy", &self.policy)
            .field("home", &self.home_worker())
            .field("state", &inner.state)
            .finish()
    }
}

fn log_detached_outcome(id: FiberId, outcome: Option<Result<(), FiberPanic>>) {
    if let Some(Err(panic)) = outcome {
        kwarn!("detached fiber {} panicked: {}", id, panic.message());
    }
}

/// Wrap the user's callable into a context body
///
/// The body finds its fiber object through TLS (the worker sets it before
/// every resume), installs the suspender and captures any panic.
pub(crate) fn fiber_entry(data: FiberData) -> ContextBody {
    Box::new(move |suspend: &dyn Suspend| {
        let Some(fiber) = tls::current_fiber() else {
            kerror!("fiber context resumed outside a worker");
            return;
        };
        fiber.install_suspender(suspend);
        let outcome = panic::catch_unwind(AssertUnwindSafe(data)).map_err(FiberPanic::from_payload);
        fiber.complete(outcome);
    })
}
