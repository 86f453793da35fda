//! Chapter 4: waiting for a group of threads
//!
//! Each task prints its index and then sleeps. `WaitGroup::wait` returns once
//! every clone handed to a task has been dropped.
//!
//! Run with: cargo run --bin ch04_wait_group -- --tasks 5 --pause-ms 1000

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use crossbeam::sync::WaitGroup;
use tracing::info;

/// Returns the indices in the order the tasks reported them.
fn run_group(tasks: usize, pause: Duration) -> Result<Vec<usize>> {
    let seen = Arc::new(Mutex::new(Vec::with_capacity(tasks)));
    let wg = WaitGroup::new();

    for i in 0..tasks {
        let wg = wg.clone();
        let seen = Arc::clone(&seen);
        thread::spawn(move || {
            println!("{}", i);
            if let Ok(mut seen) = seen.lock() {
                seen.push(i);
            }
            thread::sleep(pause);
            drop(wg);
        });
    }

    wg.wait();
    info!(tasks, "all tasks finished");

    let seen = seen.lock().map_err(|_| anyhow!("task list poisoned"))?;
    Ok(seen.clone())
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value_t = 5)]
    tasks: usize,

    /// How long each task sleeps after printing
    #[arg(long, default_value_t = 1000)]
    pause_ms: u64,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    feature_demos::telemetry::init(args.verbose);

    run_group(args.tasks, Duration::from_millis(args.pause_ms))?;
    println!("Finish");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_every_task_runs() {
        let mut seen = run_group(5, Duration::ZERO).unwrap();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_wait_blocks_until_sleepers_finish() {
        let start = Instant::now();
        run_group(3, Duration::from_millis(50)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_empty_group() {
        assert!(run_group(0, Duration::ZERO).unwrap().is_empty());
    }
}
