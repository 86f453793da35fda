//! Chapter 4: shared counter behind a mutex
//!
//! Run with: cargo run --bin ch04_mutex_sum -- --threads 5

use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{anyhow, Result};
use clap::Parser;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
#[error("sum lock poisoned")]
struct Poisoned;

#[derive(Debug, Default)]
struct Sum {
    total: Mutex<i64>,
}

impl Sum {
    fn add(&self, i: i64) -> Result<(), Poisoned> {
        let mut total = self.total.lock().map_err(|_| Poisoned)?;
        *total += i;
        Ok(())
    }

    fn get(&self) -> Result<i64, Poisoned> {
        self.total.lock().map(|total| *total).map_err(|_| Poisoned)
    }
}

fn concurrent_sum(threads: i64) -> Result<i64> {
    let sum = Arc::new(Sum::default());

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let sum = Arc::clone(&sum);
            thread::spawn(move || sum.add(i))
        })
        .collect();

    for handle in handles {
        handle.join().map_err(|_| anyhow!("adder panicked"))??;
    }

    let total = sum.get()?;
    debug!(threads, total, "all adders joined");
    Ok(total)
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value_t = 5)]
    threads: i64,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    feature_demos::telemetry::init(args.verbose);

    println!("Sum: {}", concurrent_sum(args.threads)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_threads() {
        assert_eq!(concurrent_sum(5).unwrap(), 10);
    }

    #[test]
    fn test_many_threads() {
        let n = 500;
        assert_eq!(concurrent_sum(n).unwrap(), n * (n - 1) / 2);
    }

    #[test]
    fn test_add_directly() {
        let sum = Sum::default();
        sum.add(3).unwrap();
        sum.add(-1).unwrap();
        assert_eq!(sum.get().unwrap(), 2);
    }
}
