//! Chapter 4: fixed worker pool
//!
//! `workers` threads share one input receiver (crossbeam channels are
//! multi-consumer) and each keeps pulling until the input closes. The pool
//! drops the results sender once every worker has returned.
//!
//! Run with: cargo run --bin ch04_worker_pool -- --workers 4

use std::thread;

use anyhow::{anyhow, ensure, Result};
use clap::Parser;
use crossbeam::channel::{bounded, Receiver, Sender};
use tracing::debug;

/// Largest count whose square still fits in a `u64`.
const MAX_COUNT: u64 = u32::MAX as u64;

fn generate(count: u64, tx: Sender<u64>) {
    for i in 1..=count {
        if tx.send(i).is_err() {
            break;
        }
    }
}

fn square_worker(id: usize, rx: Receiver<u64>, tx: Sender<u64>) -> usize {
    let mut handled = 0;
    for v in rx {
        if tx.send(v * v).is_err() {
            break;
        }
        handled += 1;
    }
    debug!(worker = id, handled, "worker drained input");
    handled
}

/// Runs the pool and returns how many items each worker handled.
fn run_workers(workers: usize, rx: Receiver<u64>, tx: Sender<u64>) -> Result<Vec<usize>> {
    let handles: Vec<_> = (0..workers)
        .map(|id| {
            let rx = rx.clone();
            let tx = tx.clone();
            thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || square_worker(id, rx, tx))
        })
        .collect::<Result<_, _>>()?;
    drop(tx);

    handles
        .into_iter()
        .map(|h| h.join().map_err(|_| anyhow!("worker panicked")))
        .collect()
}

fn worker_pool(count: u64, workers: usize, buffer: usize) -> Result<Vec<u64>> {
    ensure!(
        count <= MAX_COUNT,
        "count {} is above {}; its square would overflow u64",
        count,
        MAX_COUNT
    );

    let (num_tx, num_rx) = bounded(buffer);
    let (res_tx, res_rx) = bounded(buffer);

    // The pool starts before the generator, same as it would with a
    // long-lived pool waiting for work.
    let pool = thread::spawn(move || run_workers(workers, num_rx, res_tx));
    let generator = thread::spawn(move || generate(count, num_tx));

    let results: Vec<u64> = res_rx.iter().collect();

    generator.join().map_err(|_| anyhow!("generator panicked"))?;
    let per_worker = pool.join().map_err(|_| anyhow!("pool panicked"))??;
    debug!(?per_worker, "pool finished");
    Ok(results)
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(
        long,
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(..=MAX_COUNT)
    )]
    count: u64,

    /// Number of worker threads
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u16).range(1..))]
    workers: u16,

    #[arg(long, default_value_t = 10)]
    buffer: usize,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    feature_demos::telemetry::init(args.verbose);

    for result in worker_pool(args.count, usize::from(args.workers), args.buffer)? {
        println!("Result: {}", result);
    }
    println!("Finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_squares_everything() {
        let mut results = worker_pool(10, 10, 10).unwrap();
        results.sort_unstable();
        let expected: Vec<u64> = (1..=10).map(|i| i * i).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn test_single_worker_keeps_order() {
        let results = worker_pool(6, 1, 0).unwrap();
        assert_eq!(results, vec![1, 4, 9, 16, 25, 36]);
    }

    #[test]
    fn test_handled_counts_add_up() {
        let (tx, rx) = bounded(100);
        let (res_tx, res_rx) = bounded(100);
        for i in 1..=50 {
            tx.send(i).unwrap();
        }
        drop(tx);

        let per_worker = run_workers(4, rx, res_tx).unwrap();
        assert_eq!(per_worker.len(), 4);
        assert_eq!(per_worker.iter().sum::<usize>(), 50);
        assert_eq!(res_rx.iter().count(), 50);
    }

    #[test]
    fn test_count_that_would_overflow_is_rejected() {
        let err = worker_pool(MAX_COUNT + 1, 2, 1).unwrap_err();
        assert!(err.to_string().contains("would overflow"), "{}", err);
    }

    #[test]
    fn test_largest_count_squares_without_overflow() {
        assert!(MAX_COUNT.checked_mul(MAX_COUNT).is_some());
        assert!((MAX_COUNT + 1).checked_mul(MAX_COUNT + 1).is_none());
    }
}
