//! Stress test - many fibers
//!
//! Spawns a large number of fibers that each yield a few times, then
//! drains the scheduler and reports throughput.
//!
//! Usage: `stress [fibers] [workers]`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use skein::{this_fiber, Builder, Scheduler, SchedulerConfig};

fn main() -> skein::FiberResult<()> {
    println!("=== skein Stress Test ===\n");

    let mut args = std::env::args().skip(1);
    let num_fibers: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(10_000);
    let num_workers: usize = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(skein::hardware_concurrency);

    let config = SchedulerConfig::from_env()
        .num_workers(num_workers)
        .stack_size(32 * 1024);
    let sched = Scheduler::new(config)?;
    sched.start_default()?;

    println!("Spawning {} fibers on {} workers...", num_fibers, num_workers);

    let completed = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    for i in 0..num_fibers {
        let completed = completed.clone();
        let mut fiber = Builder::new().scheduler(&sched).spawn(move || {
            // Do a little work
            for _ in 0..10 {
                let _ = this_fiber::yield_now();
            }
            completed.fetch_add(1, Ordering::Relaxed);
        })?;
        fiber.detach()?;

        // Progress indicator
        if (i + 1) % 1000 == 0 {
            print!("\rSpawned: {}/{}", i + 1, num_fibers);
        }
    }

    let spawn_time = start.elapsed();
    println!("\n\nSpawn time: {:?}", spawn_time);
    println!(
        "Spawn rate: {:.0} fibers/sec",
        num_fibers as f64 / spawn_time.as_secs_f64()
    );

    println!("\nWaiting for completion...");
    let run_start = Instant::now();
    sched.join()?;

    let total_time = start.elapsed();
    let run_time = run_start.elapsed();

    println!("\n=== Results ===");
    println!("Total fibers:    {}", num_fibers);
    println!("Completed:       {}", completed.load(Ordering::Relaxed));
    println!("Spawn time:      {:?}", spawn_time);
    println!("Run time:        {:?}", run_time);
    println!("Total time:      {:?}", total_time);
    println!(
        "Throughput:      {:.0} fibers/sec",
        num_fibers as f64 / total_time.as_secs_f64()
    );
    println!(
        "Switches:        {:.0} yields/sec",
        (num_fibers * 10) as f64 / total_time.as_secs_f64()
    );

    println!("\n=== Stress Test Complete ===");
    Ok(())
}
