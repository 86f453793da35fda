//! Chapter 4: cooperative cancellation
//!
//! A producer pushes a counter into a buffered channel on every tick and a
//! writer prints whatever arrives. After the window elapses main cancels the
//! token; both tasks notice, report done, and main joins them.
//!
//! Run with: cargo run --bin ch04_cancellation -- --window-ms 10000

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

const CHANNEL_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CancellationReport {
    produced: u64,
    consumed: u64,
}

fn spawn_producer(
    token: CancellationToken,
    tx: mpsc::Sender<u64>,
    tick: Duration,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut i = 0;
        loop {
            if token.is_cancelled() {
                break;
            }
            if tx.send(i).await.is_err() {
                break;
            }
            i += 1;
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(tick) => {}
            }
        }
        println!("Producer Done");
        i
    })
}

fn spawn_writer(token: CancellationToken, mut rx: mpsc::Receiver<u64>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut consumed = 0;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(n) => {
                        println!("{}", n);
                        consumed += 1;
                    }
                    None => break,
                },
            }
        }
        println!("Writer Done");
        consumed
    })
}

async fn run(window: Duration, tick: Duration) -> Result<CancellationReport> {
    let token = CancellationToken::new();
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    let producer = spawn_producer(token.child_token(), tx, tick);
    let writer = spawn_writer(token.child_token(), rx);

    tokio::time::sleep(window).await;
    info!(?window, "window elapsed, cancelling");
    token.cancel();

    let (produced, consumed) = tokio::try_join!(producer, writer)?;
    Ok(CancellationReport { produced, consumed })
}

#[derive(Parser, Debug)]
struct Args {
    /// How long to let the tasks run before cancelling
    #[arg(long, default_value_t = 10_000)]
    window_ms: u64,

    /// Delay between produced values
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    feature_demos::telemetry::init(args.verbose);

    let report = run(
        Duration::from_millis(args.window_ms),
        Duration::from_millis(args.tick_ms),
    )
    .await?;
    info!(produced = report.produced, consumed = report.consumed, "tasks joined");
    println!("Finish");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_both_tasks_stop_after_cancel() {
        let report = run(Duration::from_millis(200), Duration::from_millis(10)).await.unwrap();
        assert!(report.produced > 0);
        assert!(report.consumed <= report.produced);
    }

    #[tokio::test]
    async fn test_zero_window_still_joins() {
        let report = run(Duration::ZERO, Duration::from_millis(10)).await.unwrap();
        assert!(report.consumed <= report.produced);
    }

    #[tokio::test]
    async fn test_writer_exits_when_producer_hangs_up() {
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(4);
        let writer = spawn_writer(token, rx);

        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        drop(tx);

        assert_eq!(writer.await.unwrap(), 2);
    }
}
