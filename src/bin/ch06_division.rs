//! Chapter 6: returning errors instead of panicking
//!
//! The function itself lives in `feature_demos::division` so the benchmark
//! under `benches/` can reach it.
//!
//! Run with: cargo run --bin ch06_division -- 3 0
//! Bench with: cargo bench --bench division

use anyhow::Result;
use clap::Parser;
use feature_demos::division::division;
use tracing::error;

#[derive(Parser, Debug)]
struct Args {
    #[arg(default_value_t = 3.0, allow_negative_numbers = true)]
    a: f64,

    #[arg(default_value_t = 1.0, allow_negative_numbers = true)]
    b: f64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    feature_demos::telemetry::init(false);

    match division(args.a, args.b) {
        Ok(res) => println!("{} / {} = {}", args.a, args.b, res),
        Err(err) => {
            error!(a = args.a, b = args.b, %err, "cannot divide");
            return Err(err.into());
        }
    }
    Ok(())
}
