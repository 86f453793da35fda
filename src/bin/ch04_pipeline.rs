//! Chapter 4: generator -> squarer pipeline
//!
//! One thread generates `1..=count`, a second squares each value, and main
//! drains the results. Each stage closes its output by dropping the sender,
//! which ends the next stage's loop.
//!
//! Run with: cargo run --bin ch04_pipeline -- --count 10

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
    debug!("generator finished");
}

fn square(rx: Receiver<u64>, tx: Sender<u64>) {
    for v in rx {
        if tx.send(v * v).is_err() {
            break;
        }
    }
    debug!("squarer finished");
}

fn square_pipeline(count: u64, buffer: usize) -> Result<Vec<u64>> {
    ensure!(
        count <= MAX_COUNT,
        "count {} is above {}; its square would overflow u64",
        count,
        MAX_COUNT
    );

    let (num_tx, num_rx) = bounded(buffer);
    let (res_tx, res_rx) = bounded(buffer);

    let generator = thread::spawn(move || generate(count, num_tx));
    let squarer = thread::spawn(move || square(num_rx, res_tx));

    let results: Vec<u64> = res_rx.iter().collect();

    generator.join().map_err(|_| anyhow!("generator panicked"))?;
    squarer.join().map_err(|_| anyhow!("squarer panicked"))?;
    Ok(results)
}

#[derive(Parser, Debug)]
struct Args {
    /// How many numbers to generate
    #[arg(
        long,
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(..=MAX_COUNT)
    )]
    count: u64,

    /// Capacity of both channels
    #[arg(long, default_value_t = 10)]
    buffer: usize,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    feature_demos::telemetry::init(args.verbose);

    for result in square_pipeline(args.count, args.buffer)? {
        println!("Result: {}", result);
    }
    println!("Finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_arrive_in_order() {
        let results = square_pipeline(10, 10).unwrap();
        assert_eq!(results, vec![1, 4, 9, 16, 25, 36, 49, 64, 81, 100]);
    }

    #[test]
    fn test_unbuffered_channels() {
        let results = square_pipeline(5, 0).unwrap();
        assert_eq!(results, vec![1, 4, 9, 16, 25]);
    }

    #[test]
    fn test_zero_count() {
        assert!(square_pipeline(0, 4).unwrap().is_empty());
    }

    #[test]
    fn test_count_that_would_overflow_is_rejected() {
        let err = square_pipeline(MAX_COUNT + 1, 1).unwrap_err();
        assert!(err.to_string().contains("would overflow"), "{}", err);
    }

    #[test]
    fn test_largest_count_squares_without_overflow() {
        assert!(MAX_COUNT.checked_mul(MAX_COUNT).is_some());
        assert!((MAX_COUNT + 1).checked_mul(MAX_COUNT + 1).is_none());
    }
}
