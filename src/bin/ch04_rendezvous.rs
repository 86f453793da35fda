//! Chapter 4: unbuffered hand-off
//!
//! Main sends a greeting over a zero-capacity channel, so the send only
//! completes once the worker has taken it. The worker prints it and then
//! drops its "done" sender; main blocks on that before finishing the line.
//!
//! Run with: cargo run --bin ch04_rendezvous

use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{anyhow, Result};
use crossbeam::channel::bounded;
use tracing::debug;

fn rendezvous(greeting: &str, suffix: &str) -> Result<String> {
    let out = Arc::new(Mutex::new(String::new()));
    let (tx, rx) = bounded::<String>(0);
    let (done_tx, done_rx) = bounded::<()>(0);

    let worker_out = Arc::clone(&out);
    let worker = thread::spawn(move || {
        if let Ok(msg) = rx.recv() {
            print!("{}", msg);
            if let Ok(mut buf) = worker_out.lock() {
                buf.push_str(&msg);
            }
        }
        debug!("worker done, closing");
        drop(done_tx);
    });

    tx.send(greeting.to_string())?;
    // Blocks until the worker drops its sender.
    let _ = done_rx.recv();
    println!("{}", suffix);

    worker.join().map_err(|_| anyhow!("worker panicked"))?;

    let mut buf = out.lock().map_err(|_| anyhow!("output lock poisoned"))?;
    buf.push_str(suffix);
    buf.push('\n');
    Ok(buf.clone())
}

fn main() -> Result<()> {
    feature_demos::telemetry::init(false);
    rendezvous("Hello", ", World!")?;
    Ok(())
}
