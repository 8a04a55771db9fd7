//! User-facing fiber handle and builder

use std::sync::Arc;

use skein_core::constants::MIN_STACK_SIZE;
use skein_core::{kerror, FiberError, FiberId, FiberResult, FiberState, SchedulingPolicy};

use crate::fiber::FiberObject;
use crate::scheduler::Scheduler;
use crate::tls;

/// Per-fiber scheduling attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FiberAttributes {
    pub policy: SchedulingPolicy,
}

impl FiberAttributes {
    /// Freely scheduled on any worker
    pub const NORMAL: FiberAttributes = FiberAttributes::new(SchedulingPolicy::Normal);

    /// Pinned to the spawning fiber's worker
    pub const STICK_WITH_PARENT: FiberAttributes =
        FiberAttributes::new(SchedulingPolicy::StickWithParent);

    pub const fn new(policy: SchedulingPolicy) -> Self {
        Self { policy }
    }
}

/// Fiber factory, used to configure a fiber before spawning it
///
/// ```ignore
/// let fiber = Builder::new()
///     .name("ticker")
///     .attributes(FiberAttributes::STICK_WITH_PARENT)
///     .spawn(|| { /* ... */ })?;
/// ```
#[derive(Debug, Default)]
pub struct Builder {
    name: Option<String>,
    attributes: FiberAttributes,
    scheduler: Option<Scheduler>,
    stack_size: Option<usize>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn policy(mut self, policy: SchedulingPolicy) -> Self {
        self.attributes.policy = policy;
        self
    }

    pub fn attributes(mut self, attributes: FiberAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Run on `scheduler` instead of the default one
    pub fn scheduler(mut self, scheduler: &Scheduler) -> Self {
        self.scheduler = Some(scheduler.clone());
        self
    }

    /// Override the scheduler's configured stack size
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Spawn the fiber and enqueue it
    ///
    /// Without an explicit scheduler the fiber goes to the calling worker's
    /// scheduler, or to `Scheduler::instance()` off-worker.
    pub fn spawn<F>(self, f: F) -> FiberResult<Fiber>
    where
        F: FnOnce() + Send + 'static,
    {
        if matches!(self.stack_size, Some(size) if size < MIN_STACK_SIZE) {
            return Err(FiberError::InvalidConfig(format!(
                "stack_size must be >= {} bytes",
                MIN_STACK_SIZE
            )));
        }
        let scheduler = match self.scheduler {
            Some(sched) => sched,
            None => default_scheduler(),
        };
        let object = scheduler.inner().spawn_fiber(
            Box::new(f),
            self.name.unwrap_or_default(),
            self.attributes.policy,
            self.stack_size,
        )?;
        Ok(Fiber {
            object: Some(object),
        })
    }
}

fn default_scheduler() -> Scheduler {
    match tls::current_worker() {
        Some((inner, _)) => Scheduler::from_inner(inner),
        None => Scheduler::instance(),
    }
}

/// Handle to a spawned fiber
///
/// Must be joined or detached before it is dropped; dropping a joinable
/// handle panics, or aborts the process when done inside a fiber.
#[derive(Default)]
pub struct Fiber {
    object: Option<Arc<FiberObject>>,
}

impl Fiber {
    /// Spawn `f` with default attributes on the default scheduler
    pub fn spawn<F>(f: F) -> FiberResult<Fiber>
    where
        F: FnOnce() + Send + 'static,
    {
        Builder::new().spawn(f)
    }

    /// Check if the handle still owns a running or finished, not yet
    /// joined/detached fiber
    #[inline]
    pub fn joinable(&self) -> bool {
        self.object.is_some()
    }

    /// Fiber id, `FiberId::NONE` for an empty handle
    pub fn id(&self) -> FiberId {
        self.object.as_ref().map_or(FiberId::NONE, |o| o.id())
    }

    /// Current state, `None` for an empty handle
    pub fn state(&self) -> Option<FiberState> {
        self.object.as_ref().map(|o| o.state())
    }

    fn object(&self) -> FiberResult<&Arc<FiberObject>> {
        self.object.as_ref().ok_or(FiberError::InvalidFiber)
    }

    pub fn name(&self) -> FiberResult<String> {
        Ok(self.object()?.name())
    }

    pub fn set_name(&self, name: &str) -> FiberResult<()> {
        self.object()?.set_name(name);
        Ok(())
    }

    /// Wait for the fiber to finish
    ///
    /// From a fiber this suspends only the caller; from a plain thread it
    /// blocks the thread. With `propagate_panic`, a panic captured from the
    /// fiber is returned as `FiberError::Panicked`; otherwise it is dropped.
    ///
    /// `SelfJoin` and `Deadlock` leave the handle joinable.
    pub fn join(&mut self, propagate_panic: bool) -> FiberResult<()> {
        let object = Arc::clone(self.object()?);
        match tls::current_fiber() {
            Some(current) => current.join_fiber(&object)?,
            None => object.wait_finished(),
        }
        self.object = None;

        match object.take_outcome() {
            Some(Err(panic)) if propagate_panic => Err(FiberError::Panicked(panic)),
            _ => Ok(()),
        }
    }

    /// Let the fiber run on unobserved
    pub fn detach(&mut self) -> FiberResult<()> {
        let object = self.object.take().ok_or(FiberError::InvalidFiber)?;
        object.detach();
        Ok(())
    }

    /// Exchange the fibers owned by two handles
    pub fn swap(&mut self, other: &mut Fiber) {
        std::mem::swap(&mut self.object, &mut other.object);
    }
}

impl Drop for Fiber {
    fn drop(&mut self) {
        let Some(object) = &self.object else { return };
        if std::thread::panicking() {
            kerror!("fiber {} dropped while joinable during unwinding, aborting", object.id());
            std::process::abort();
        }
        // A panic here would be captured as the enclosing fiber's outcome
        if tls::in_fiber() {
            kerror!("fiber {} dropped while joinable inside a fiber, aborting", object.id());
            std::process::abort();
        }
        panic!(
            "fiber {} dropped while still joinable; call join() or detach() first",
            object.id()
        );
    }
}

impl std::fmt::Debug for Fiber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.id())
            .field("joinable", &self.joinable())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn sched() -> Scheduler {
        Scheduler::new(SchedulerConfig::new().num_workers(1).stack_size(64 * 1024)).unwrap()
    }

    #[test]
    fn test_empty_handle() {
        let mut fiber = Fiber::default();
        assert!(!fiber.joinable());
        assert_eq!(fiber.id(), FiberId::NONE);
        assert!(fiber.state().is_none());
        assert!(matches!(fiber.join(true), Err(FiberError::InvalidFiber)));
        assert!(matches!(fiber.detach(), Err(FiberError::InvalidFiber)));
        assert!(matches!(fiber.name(), Err(FiberError::InvalidFiber)));
        assert!(matches!(fiber.set_name("x"), Err(FiberError::InvalidFiber)));
    }

    #[test]
    fn test_spawn_join() {
        let sched = sched();
        sched.start(1).unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        let mut fiber = Builder::new()
            .name("probe")
            .scheduler(&sched)
            .spawn(move || r.store(true, Ordering::SeqCst))
            .unwrap();

        assert!(fiber.joinable());
        assert!(fiber.id().is_some());
        assert_eq!(fiber.name().unwrap(), "probe");

        fiber.join(true).unwrap();
        assert!(!fiber.joinable());
        assert!(ran.load(Ordering::SeqCst));
        assert!(matches!(fiber.join(true), Err(FiberError::InvalidFiber)));
        sched.join().unwrap();
    }

    #[test]
    fn test_swap() {
        let sched = sched();
        let mut a = Builder::new().scheduler(&sched).spawn(|| {}).unwrap();
        let mut b = Fiber::default();
        let id = a.id();

        a.swap(&mut b);
        assert!(!a.joinable());
        assert_eq!(b.id(), id);

        sched.start(1).unwrap();
        b.join(false).unwrap();
        sched.join().unwrap();
    }

    #[test]
    fn test_tiny_stack_rejected() {
        let sched = sched();
        let err = Builder::new().scheduler(&sched).stack_size(1024).spawn(|| {});
        match err {
            Err(FiberError::InvalidConfig(msg)) => {
                assert!(msg.contains(&MIN_STACK_SIZE.to_string()), "{}", msg)
            }
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_attributes() {
        assert_eq!(FiberAttributes::default(), FiberAttributes::NORMAL);
        assert_eq!(
            FiberAttributes::STICK_WITH_PARENT.policy,
            SchedulingPolicy::StickWithParent
        );
    }
}
