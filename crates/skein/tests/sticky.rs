//! Stick-with-parent fibers stay on their parent's worker

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use skein::{this_fiber, Builder, FiberAttributes, Scheduler, SchedulerConfig, SchedulingPolicy};

const ITERATIONS: usize = 1000;

fn scheduler(workers: usize) -> Scheduler {
    Scheduler::new(
        SchedulerConfig::new()
            .num_workers(workers)
            .stack_size(64 * 1024),
    )
    .unwrap()
}

/// Worker index seen on every iteration of a yield loop
fn yield_loop(iterations: usize) -> Vec<usize> {
    let mut seen = Vec::with_capacity(iterations);
    for _ in 0..iterations {
        seen.push(this_fiber::worker_index().unwrap());
        this_fiber::yield_now().unwrap();
    }
    seen
}

#[test]
fn test_child_runs_on_parent_worker() {
    let sched = scheduler(4);
    sched.start(4).unwrap();

    let parent_seen = Arc::new(Mutex::new(Vec::new()));
    let child_seen = Arc::new(Mutex::new(Vec::new()));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let (ps, cs, ov) = (parent_seen.clone(), child_seen.clone(), overlaps.clone());
    let mut parent = Builder::new()
        .scheduler(&sched)
        .spawn(move || {
            let running = Arc::new(AtomicUsize::new(0));
            let (child_running, child_ov) = (running.clone(), ov.clone());
            let mut child = Builder::new()
                .attributes(FiberAttributes::STICK_WITH_PARENT)
                .spawn(move || {
                    *cs.lock() = exclusive_yield_loop(ITERATIONS, &child_running, &child_ov)
                })
                .unwrap();
            *ps.lock() = exclusive_yield_loop(ITERATIONS, &running, &ov);
            child.join(true).unwrap();
        })
        .unwrap();
    parent.join(true).unwrap();
    sched.join().unwrap();

    let a = parent_seen.lock();
    let b = child_seen.lock();
    assert_eq!(a.len(), ITERATIONS);
    assert_eq!(b.len(), ITERATIONS);
    for i in 0..ITERATIONS {
        assert_eq!(a[i], b[i], "iteration {} ran on different workers", i);
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

/// Like `yield_loop`, counting any time another fiber of the group was
/// running at the same moment
fn exclusive_yield_loop(
    iterations: usize,
    running: &AtomicUsize,
    overlaps: &AtomicUsize,
) -> Vec<usize> {
    let mut seen = Vec::with_capacity(iterations);
    for _ in 0..iterations {
        if running.fetch_add(1, Ordering::SeqCst) != 0 {
            overlaps.fetch_add(1, Ordering::SeqCst);
        }
        seen.push(this_fiber::worker_index().unwrap());
        running.fetch_sub(1, Ordering::SeqCst);
        this_fiber::yield_now().unwrap();
    }
    seen
}

#[test]
fn test_sticky_chain_shares_one_worker() {
    let sched = scheduler(4);
    sched.start(4).unwrap();

    let a_seen = Arc::new(Mutex::new(Vec::new()));
    let b_seen = Arc::new(Mutex::new(Vec::new()));

    let (a_log, b_log) = (a_seen.clone(), b_seen.clone());
    let mut root = Builder::new()
        .scheduler(&sched)
        .spawn(move || {
            let mut a = Builder::new()
                .policy(SchedulingPolicy::StickWithParent)
                .spawn(move || {
                    let mut b = Builder::new()
                        .policy(SchedulingPolicy::StickWithParent)
                        .spawn(move || *b_log.lock() = yield_loop(ITERATIONS))
                        .unwrap();
                    *a_log.lock() = yield_loop(ITERATIONS);
                    b.join(true).unwrap();
                })
                .unwrap();
            a.join(true).unwrap();
        })
        .unwrap();
    root.join(true).unwrap();
    sched.join().unwrap();

    let a = a_seen.lock();
    let b = b_seen.lock();
    assert_eq!(a.len(), ITERATIONS);
    assert_eq!(b.len(), ITERATIONS);
    for i in 0..ITERATIONS {
        assert_eq!(a[i], b[i], "iteration {} ran on different workers", i);
    }
}

#[test]
fn test_sticky_from_plain_thread_degrades_to_normal() {
    let sched = scheduler(2);
    sched.start(2).unwrap();

    let mut fiber = Builder::new()
        .scheduler(&sched)
        .attributes(FiberAttributes::STICK_WITH_PARENT)
        .spawn(|| {
            for _ in 0..10 {
                assert!(this_fiber::worker_index().is_some());
                this_fiber::yield_now().unwrap();
            }
        })
        .unwrap();
    fiber.join(true).unwrap();
    sched.join().unwrap();
}
