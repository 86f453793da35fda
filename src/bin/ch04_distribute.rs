//! Chapter 4: one thread per item
//!
//! The distributor spawns a short-lived thread for every value it receives.
//! A `WaitGroup` tracks them; only after it drains does the distributor drop
//! the results sender, closing the channel for main.
//!
//! Run with: cargo run --bin ch04_distribute -- --count 10

use std::thread;

use anyhow::{anyhow, ensure, Result};
use clap::Parser;
use crossbeam::channel::{bounded, Receiver, Sender};
use crossbeam::sync::WaitGroup;
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

fn distribute(rx: Receiver<u64>, results: Sender<u64>) {
    let wg = WaitGroup::new();
    for v in rx {
        let wg = wg.clone();
        let results = results.clone();
        thread::spawn(move || {
            debug!(value = v, "squaring");
            let _ = results.send(v * v);
            drop(wg);
        });
    }
    wg.wait();
    // `results` drops here: the last sender, so main's loop ends.
}

fn distribute_squares(count: u64, buffer: usize) -> Result<Vec<u64>> {
    ensure!(
        count <= MAX_COUNT,
        "count {} is above {}; its square would overflow u64",
        count,
        MAX_COUNT
    );

    let (num_tx, num_rx) = bounded(buffer);
    let (res_tx, res_rx) = bounded(buffer);

    let generator = thread::spawn(move || generate(count, num_tx));
    let distributor = thread::spawn(move || distribute(num_rx, res_tx));

    let results: Vec<u64> = res_rx.iter().collect();

    generator.join().map_err(|_| anyhow!("generator panicked"))?;
    distributor.join().map_err(|_| anyhow!("distributor panicked"))?;
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

    #[arg(long, default_value_t = 10)]
    buffer: usize,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    feature_demos::telemetry::init(args.verbose);

    for result in distribute_squares(args.count, args.buffer)? {
        println!("Result: {}", result);
    }
    println!("Finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_value_squared_once() {
        let mut results = distribute_squares(10, 10).unwrap();
        results.sort_unstable();
        let expected: Vec<u64> = (1..=10).map(|i| i * i).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn test_more_items_than_buffer() {
        let mut results = distribute_squares(200, 2).unwrap();
        results.sort_unstable();
        assert_eq!(results.len(), 200);
        assert_eq!(results.last(), Some(&40_000));
    }

    #[test]
    fn test_zero_count() {
        assert!(distribute_squares(0, 1).unwrap().is_empty());
    }

    #[test]
    fn test_count_that_would_overflow_is_rejected() {
        let err = distribute_squares(MAX_COUNT + 1, 1).unwrap_err();
        assert!(err.to_string().contains("would overflow"), "{}", err);
    }

    #[test]
    fn test_largest_count_squares_without_overflow() {
        assert!(MAX_COUNT.checked_mul(MAX_COUNT).is_some());
        assert!((MAX_COUNT + 1).checked_mul(MAX_COUNT + 1).is_none());
    }
}
