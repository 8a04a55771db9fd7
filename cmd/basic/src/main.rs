//! Basic skein example
//!
//! Spawns a few fibers on two workers: named fibers that yield, a
//! stick-with-parent child, a sleeper, and one that panics.
//!
//! # Environment Variables
//!
//! - `SKEIN_FLUSH_EPRINT=1` - Flush debug output immediately (useful for crash debugging)
//! - `SKEIN_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use skein::{kdebug, kinfo, this_fiber, Builder, FiberAttributes, Scheduler, SchedulerConfig};

// SKEIN_LOG_LEVEL=debug SKEIN_FLUSH_EPRINT=1 cargo run -p skein-basic
fn main() -> skein::FiberResult<()> {
    println!("=== skein Basic Example ===\n");

    let config = SchedulerConfig::from_env().num_workers(2).debug_logging(true);
    config.print();
    let sched = Scheduler::new(config)?;
    sched.start_default()?;

    let completed = Arc::new(AtomicUsize::new(0));
    let mut fibers = Vec::new();

    for i in 1..=3 {
        let c = completed.clone();
        let fiber = Builder::new()
            .scheduler(&sched)
            .name(format!("worker-{}", i))
            .spawn(move || {
                let name = this_fiber::name().unwrap_or_default();
                for j in 0..3 {
                    kdebug!("[{}] iteration {} on worker {:?}", name, j, this_fiber::worker_index());
                    let _ = this_fiber::yield_now();
                }
                c.fetch_add(1, Ordering::SeqCst);
            })?;
        println!("Spawned fiber {} (ID={})", i, fiber.id());
        fibers.push(fiber);
    }

    // Parent with a pinned child
    let c = completed.clone();
    fibers.push(Builder::new().scheduler(&sched).name("parent").spawn(move || {
        let home = this_fiber::worker_index();
        let child = Builder::new()
            .attributes(FiberAttributes::STICK_WITH_PARENT)
            .name("child")
            .spawn(move || {
                for _ in 0..5 {
                    assert_eq!(this_fiber::worker_index(), home);
                    let _ = this_fiber::yield_now();
                }
            });
        match child {
            Ok(mut child) => {
                let _ = child.join(true);
                kinfo!("child stayed on worker {:?}", home);
            }
            Err(e) => kinfo!("could not spawn child: {}", e),
        }
        c.fetch_add(1, Ordering::SeqCst);
    })?);

    // Sleeper
    let c = completed.clone();
    fibers.push(Builder::new().scheduler(&sched).name("sleeper").spawn(move || {
        let start = Instant::now();
        let _ = this_fiber::sleep_for(Duration::from_millis(20));
        kinfo!("slept {:?}", start.elapsed());
        c.fetch_add(1, Ordering::SeqCst);
    })?);

    let mut faulty = Builder::new()
        .scheduler(&sched)
        .name("faulty")
        .spawn(|| panic!("deliberate failure"))?;

    println!("\nWaiting for {} fibers to complete...\n", fibers.len());
    for fiber in &mut fibers {
        fiber.join(true)?;
    }
    match faulty.join(true) {
        Err(e) => println!("faulty fiber reported: {}", e),
        Ok(()) => println!("faulty fiber unexpectedly succeeded"),
    }

    sched.join()?;
    kinfo!("{} fiber(s) completed", completed.load(Ordering::SeqCst));

    println!("\n=== Example Complete ===");
    Ok(())
}
