//! Worker threads
//!
//! Each worker is an OS thread with a local ready-queue (stick-with-parent
//! fibers pinned to it) and a parker. The run loop:
//!
//! ```text
//!   loop {
//!       poll reactor (posted tasks, expired timers)
//!       pop fiber: shared first every Nth tick, else local then shared
//!       run it, act on how it suspended
//!       idle: spin a little, then park until woken / next timer / timeout
//!       exit once the scheduler is draining and fully idle
//!   }
//! ```

use std::sync::atomic::{fence, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_queue::SegQueue;
use skein_core::{kdebug, kinfo, kprint, ktrace};

use crate::context::ContextStatus;
use crate::fiber::{FiberObject, Suspension};
use crate::parking::Parker;
use crate::scheduler::SchedulerInner;
use crate::tls;

/// State of one worker shared with the rest of the scheduler
pub(crate) struct WorkerShared {
    pub(crate) index: usize,
    /// Fibers pinned to this worker (many producers, this worker consumes)
    pub(crate) local: SegQueue<Arc<FiberObject>>,
    pub(crate) parker: Parker,
}

impl WorkerShared {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            local: SegQueue::new(),
            parker: Parker::new(),
        }
    }

    /// Push a pinned fiber and wake this worker if it sleeps
    pub(crate) fn push_local(&self, fiber: Arc<FiberObject>) {
        self.local.push(fiber);
        fence(Ordering::SeqCst);
        self.parker.unpark();
    }

    fn next_fiber(&self, sched: &SchedulerInner, tick: &mut u32) -> Option<Arc<FiberObject>> {
        *tick = tick.wrapping_add(1);
        if *tick % sched.config().shared_check_interval == 0 {
            if let Some(fiber) = sched.pop_shared() {
                return Some(fiber);
            }
        }
        self.local.pop().or_else(|| sched.pop_shared())
    }

    fn has_work(&self, sched: &SchedulerInner) -> bool {
        !self.local.is_empty() || sched.has_ready_work()
    }
}

pub(crate) fn worker_main_loop(sched: Arc<SchedulerInner>, me: Arc<WorkerShared>) {
    tls::set_worker(Arc::clone(&sched), me.index);
    kprint::set_worker_id(me.index as u32);

    let debug = sched.config().debug_logging;
    let spin_limit = sched.config().idle_spins;
    let park_timeout = sched.config().park_timeout;

    if debug {
        kinfo!("worker started");
    }

    let mut tick: u32 = 0;
    let mut idle_spins: u32 = 0;

    loop {
        let reactor = sched.reactor();
        let polled = if reactor.pending() > 0 {
            reactor.poll(Instant::now())
        } else {
            0
        };

        if let Some(fiber) = me.next_fiber(&sched, &mut tick) {
            idle_spins = 0;
            run_fiber(&sched, &me, fiber);
            continue;
        }
        if polled > 0 {
            idle_spins = 0;
            continue;
        }
        if sched.should_exit() {
            break;
        }

        if idle_spins < spin_limit {
            // Quick spin first (catch fast ready -> run cycles)
            idle_spins += 1;
            for _ in 0..32 {
                std::hint::spin_loop();
            }
            std::thread::yield_now();
            continue;
        }
        idle_spins = 0;

        me.parker.prepare_park();
        if me.has_work(&sched) || sched.should_exit() {
            me.parker.cancel_park();
            continue;
        }
        let timeout = match reactor.next_deadline() {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(park_timeout),
            None => park_timeout,
        };
        ktrace!("parking for {:?}", timeout);
        me.parker.park(timeout);
    }

    if debug {
        kinfo!("worker exiting");
    }
    kprint::clear_worker_id();
    tls::clear_worker();
}

/// Resume one fiber, then act on how it came back
fn run_fiber(sched: &Arc<SchedulerInner>, me: &WorkerShared, fiber: Arc<FiberObject>) {
    let Some(mut context) = fiber.begin_run(me.index) else {
        return;
    };

    tls::set_current_fiber(Arc::clone(&fiber));
    kprint::set_fiber_id(fiber.id().as_u64());
    ktrace!("resume");

    let status = context.resume();

    kprint::clear_fiber_id();
    tls::clear_current_fiber();

    match status {
        ContextStatus::Suspended => match fiber.end_run(context) {
            Suspension::Yield => sched.make_ready(fiber),
            Suspension::Sleep(deadline) => {
                let sleeper = fiber;
                sched.reactor().add_timer(deadline, move || {
                    if let Some(owner) = sleeper.scheduler() {
                        owner.make_ready(sleeper);
                    }
                });
            }
            Suspension::Join(target) => {
                if !target.register_joiner(Arc::clone(&fiber)) {
                    sched.make_ready(fiber);
                }
            }
        },
        ContextStatus::Finished => {
            drop(context);
            let joiners = fiber.finish();
            if sched.config().debug_logging {
                kinfo!("fiber {} finished", fiber.id());
            } else {
                kdebug!("fiber {} finished", fiber.id());
            }
            for joiner in joiners {
                match joiner.scheduler() {
                    Some(owner) => owner.make_ready(joiner),
                    None => kdebug!("joiner {} outlived its scheduler", joiner.id()),
                }
            }
            sched.fiber_exited();
        }
    }
}
