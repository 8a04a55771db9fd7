//! Scheduler: worker pool, ready-queues and fiber bookkeeping
//!
//! ```text
//!                     Scheduler (Clone handle)
//!                            │
//!                            ▼
//!   ┌──────────────────── SchedulerInner ─────────────────────┐
//!   │  shared: SegQueue<fiber>      ◄── normal fibers          │
//!   │  workers[i].local: SegQueue   ◄── stick-with-parent      │
//!   │  reactor: posted tasks + timers (sleep wakeups)          │
//!   │  live_fibers, draining                                   │
//!   └──────────────────────────────────────────────────────────┘
//!        │ worker 0        │ worker 1       ...  │ worker n-1
//!        ▼                 ▼                      ▼
//!    worker_main_loop  worker_main_loop      worker_main_loop
//! ```
//!
//! Normal fibers migrate freely: whichever worker pops the shared queue runs
//! them. Stick-with-parent fibers only ever sit in their home worker's local
//! queue.
//!
//! Stop policy: `join()` marks the scheduler draining. A worker exits once it
//! is draining, no fiber is alive and the reactor has nothing pending. After
//! `join()` returns the scheduler can be started again.

use std::sync::atomic::{fence, AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use crossbeam_queue::SegQueue;
use parking_lot::{const_mutex, Mutex, RwLock};
use skein_core::{
    kdebug, kerror, kinfo, kwarn, FiberError, FiberResult, SchedulingPolicy,
};

use crate::config::SchedulerConfig;
use crate::context::{ContextFactory, CoroutineFactory};
use crate::fiber::{fiber_entry, FiberData, FiberObject};
use crate::reactor::Reactor;
use crate::tls;
use crate::worker::{worker_main_loop, WorkerShared};

/// Process-wide default scheduler
static INSTANCE: Mutex<Option<Scheduler>> = const_mutex(None);

pub(crate) struct SchedulerInner {
    config: SchedulerConfig,
    factory: Box<dyn ContextFactory>,
    reactor: Reactor,
    /// Ready normal fibers
    shared: SegQueue<Arc<FiberObject>>,
    workers: RwLock<Vec<Arc<WorkerShared>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    /// Serializes start / add_worker_thread / the teardown half of join
    lifecycle: Mutex<()>,
    live_fibers: AtomicUsize,
    draining: AtomicBool,
}

impl SchedulerInner {
    #[inline]
    pub(crate) fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[inline]
    pub(crate) fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    #[inline]
    pub(crate) fn pop_shared(&self) -> Option<Arc<FiberObject>> {
        self.shared.pop()
    }

    /// Anything a worker could act on without waiting
    pub(crate) fn has_ready_work(&self) -> bool {
        if !self.shared.is_empty() || self.reactor.has_tasks() {
            return true;
        }
        matches!(self.reactor.next_deadline(), Some(d) if d <= std::time::Instant::now())
    }

    pub(crate) fn should_exit(&self) -> bool {
        self.draining.load(Ordering::Acquire)
            && self.live_fibers.load(Ordering::Acquire) == 0
            && self.reactor.pending() == 0
    }

    /// Put a fiber on the queue its policy dictates
    pub(crate) fn make_ready(&self, fiber: Arc<FiberObject>) {
        if !fiber.mark_ready() {
            return;
        }
        if let Some(home) = fiber.home_worker() {
            let worker = self.workers.read().get(home).cloned();
            if let Some(worker) = worker {
                worker.push_local(fiber);
                return;
            }
            kwarn!("fiber {} lost its home worker {}, running it anywhere", fiber.id(), home);
        }
        self.shared.push(fiber);
        self.wake_one();
    }

    /// Wake one parked worker, if any
    pub(crate) fn wake_one(&self) {
        fence(Ordering::SeqCst);
        for worker in self.workers.read().iter() {
            if worker.parker.unpark() {
                return;
            }
        }
    }

    fn wake_all(&self) {
        for worker in self.workers.read().iter() {
            worker.parker.force_unpark();
        }
    }

    pub(crate) fn fiber_exited(&self) {
        if self.live_fibers.fetch_sub(1, Ordering::AcqRel) == 1
            && self.draining.load(Ordering::Acquire)
        {
            self.wake_all();
        }
    }

    /// Worker a stick-with-parent child shares with its creator
    ///
    /// A creating fiber is pinned along with the child, so the two never
    /// run at the same time. `None` when the caller is not on one of this
    /// scheduler's workers.
    fn parent_home(self: &Arc<Self>) -> Option<usize> {
        let (owner, index) = tls::current_worker()?;
        if !Arc::ptr_eq(&owner, self) {
            return None;
        }
        match tls::current_fiber() {
            Some(parent) => Some(parent.pin_to(index)),
            None => Some(index),
        }
    }

    pub(crate) fn spawn_fiber(
        self: &Arc<Self>,
        data: FiberData,
        name: String,
        policy: SchedulingPolicy,
        stack_size: Option<usize>,
    ) -> FiberResult<Arc<FiberObject>> {
        let home = match policy {
            SchedulingPolicy::StickWithParent => self.parent_home(),
            SchedulingPolicy::Normal => None,
        };

        let stack_size = stack_size.unwrap_or(self.config.stack_size);
        let context = self.factory.create(stack_size, fiber_entry(data))?;
        let fiber = FiberObject::new(name, policy, home, Arc::downgrade(self), context);

        self.live_fibers.fetch_add(1, Ordering::AcqRel);
        match home {
            Some(w) => kdebug!("spawn fiber {} pinned to worker {}", fiber.id(), w),
            None => kdebug!("spawn fiber {} ({})", fiber.id(), policy),
        }
        self.make_ready(Arc::clone(&fiber));
        Ok(fiber)
    }

    /// Grow the pool by `n` threads; caller holds `lifecycle`
    fn spawn_workers(self: &Arc<Self>, n: usize) -> FiberResult<()> {
        for _ in 0..n {
            let worker = {
                let mut workers = self.workers.write();
                if workers.len() >= self.config.max_workers {
                    return Err(FiberError::ResourceExhaustion(format!(
                        "worker limit of {} reached",
                        self.config.max_workers
                    )));
                }
                let worker = Arc::new(WorkerShared::new(workers.len()));
                workers.push(Arc::clone(&worker));
                worker
            };

            let sched = Arc::clone(self);
            let me = Arc::clone(&worker);
            let spawned = std::thread::Builder::new()
                .name(format!("skein-worker-{}", worker.index))
                .spawn(move || worker_main_loop(sched, me));

            match spawned {
                Ok(handle) => self.handles.lock().push(handle),
                Err(e) => {
                    self.workers.write().pop();
                    return Err(FiberError::ResourceExhaustion(format!(
                        "spawning worker thread: {}",
                        e
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Handle to a fiber scheduler
///
/// Cheap to clone; all clones drive the same worker pool.
///
/// # Example
///
/// ```ignore
/// use skein_runtime::{Builder, Scheduler, SchedulerConfig};
///
/// let sched = Scheduler::new(SchedulerConfig::new().num_workers(2))?;
/// sched.start_default()?;
/// let mut fiber = Builder::new().scheduler(&sched).spawn(|| println!("hi"))?;
/// fiber.join(true)?;
/// sched.join()?;
/// ```
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Create a scheduler with validated configuration and the default
    /// context backend. No workers run until `start()`.
    pub fn new(config: SchedulerConfig) -> FiberResult<Self> {
        Self::with_context_factory(config, Box::new(CoroutineFactory))
    }

    /// Library defaults, no environment overrides
    pub fn with_defaults() -> Self {
        Self::build(SchedulerConfig::new(), Box::new(CoroutineFactory))
    }

    /// Create a scheduler that allocates fiber contexts through `factory`
    pub fn with_context_factory(
        config: SchedulerConfig,
        factory: Box<dyn ContextFactory>,
    ) -> FiberResult<Self> {
        config.validate()?;
        Ok(Self::build(config, factory))
    }

    fn build(config: SchedulerConfig, factory: Box<dyn ContextFactory>) -> Self {
        if config.debug_logging {
            kinfo!("scheduler created (context backend: {})", factory.name());
        }
        let inner = Arc::new_cyclic(|weak: &Weak<SchedulerInner>| {
            let weak = weak.clone();
            SchedulerInner {
                config,
                factory,
                reactor: Reactor::with_waker(move || {
                    if let Some(sched) = weak.upgrade() {
                        sched.wake_one();
                    }
                }),
                shared: SegQueue::new(),
                workers: RwLock::new(Vec::new()),
                handles: Mutex::new(Vec::new()),
                lifecycle: Mutex::new(()),
                live_fibers: AtomicUsize::new(0),
                draining: AtomicBool::new(false),
            }
        });
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<SchedulerInner>) -> Self {
        Self { inner }
    }

    #[inline]
    pub(crate) fn inner(&self) -> &Arc<SchedulerInner> {
        &self.inner
    }

    /// The scheduler's event loop
    pub fn reactor(&self) -> Reactor {
        self.inner.reactor.clone()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Start `n` worker threads
    ///
    /// No-op if exactly `n` workers are already running;
    /// `AlreadyStarted` if a different number is.
    pub fn start(&self, n: usize) -> FiberResult<()> {
        if n == 0 {
            return Err(FiberError::InvalidConfig("start() needs at least one worker".into()));
        }
        let _lifecycle = self.inner.lifecycle.lock();
        let running = self.inner.workers.read().len();
        if running == n {
            return Ok(());
        }
        if running != 0 {
            return Err(FiberError::AlreadyStarted {
                running,
                requested: n,
            });
        }
        if self.inner.config.debug_logging {
            kinfo!("starting {} workers", n);
        }
        self.inner.spawn_workers(n)
    }

    /// Start `config().num_workers` worker threads
    pub fn start_default(&self) -> FiberResult<()> {
        self.start(self.inner.config.num_workers)
    }

    /// Grow the pool by `n` workers; starts the pool if it is not running
    pub fn add_worker_thread(&self, n: usize) -> FiberResult<()> {
        let _lifecycle = self.inner.lifecycle.lock();
        self.inner.spawn_workers(n)
    }

    /// Wait until every worker has exited
    ///
    /// Workers exit once no fiber is alive and the reactor is idle. Must be
    /// called from a plain thread, not from a fiber or one of this
    /// scheduler's workers.
    pub fn join(&self) -> FiberResult<()> {
        if tls::in_fiber() {
            return Err(FiberError::JoinFromFiber);
        }
        if let Some((owner, _)) = tls::current_worker() {
            if Arc::ptr_eq(&owner, &self.inner) {
                return Err(FiberError::JoinFromFiber);
            }
        }

        {
            let _lifecycle = self.inner.lifecycle.lock();
            self.inner.draining.store(true, Ordering::Release);
            self.inner.wake_all();
        }

        // Workers may be added while draining; keep joining until none remain
        loop {
            let handle = self.inner.handles.lock().pop();
            let Some(handle) = handle else { break };
            if handle.join().is_err() {
                kerror!("worker thread panicked");
            }
        }

        let _lifecycle = self.inner.lifecycle.lock();
        if self.inner.handles.lock().is_empty() {
            self.inner.workers.write().clear();
            self.inner.draining.store(false, Ordering::Release);
        }
        if self.inner.config.debug_logging {
            kinfo!("scheduler joined");
        }
        Ok(())
    }

    /// Number of worker threads in the pool
    pub fn num_workers(&self) -> usize {
        self.inner.workers.read().len()
    }

    /// Fibers spawned and not yet finished
    pub fn live_fibers(&self) -> usize {
        self.inner.live_fibers.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.num_workers() > 0
    }

    /// Check if two handles refer to the same scheduler
    pub fn ptr_eq(&self, other: &Scheduler) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ========================================================================
    // Process-wide default instance
    // ========================================================================

    /// The process-wide default scheduler, created on first use from
    /// `SchedulerConfig::from_env()`. Not started automatically.
    pub fn instance() -> Scheduler {
        let mut slot = INSTANCE.lock();
        if let Some(sched) = slot.as_ref() {
            return sched.clone();
        }
        let sched = match Scheduler::new(SchedulerConfig::from_env()) {
            Ok(sched) => sched,
            Err(e) => {
                kwarn!("invalid scheduler environment ({}), using defaults", e);
                Scheduler::with_defaults()
            }
        };
        *slot = Some(sched.clone());
        sched
    }

    /// Drop the default instance so the next `instance()` builds a new one
    ///
    /// Fails with `InstanceInUse` while workers, fibers or other handles
    /// still reference it.
    pub fn reset_instance() -> FiberResult<()> {
        let mut slot = INSTANCE.lock();
        if let Some(sched) = slot.as_ref() {
            if Arc::strong_count(&sched.inner) > 1 || sched.live_fibers() > 0 {
                return Err(FiberError::InstanceInUse);
            }
        }
        *slot = None;
        Ok(())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("workers", &self.num_workers())
            .field("live_fibers", &self.live_fibers())
            .field("reactor", &self.inner.reactor)
            .finish()
    }
}
