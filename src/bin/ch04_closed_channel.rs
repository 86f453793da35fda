//! Chapter 4: receiving from a closed channel
//!
//! Once every sender is gone, a receive returns immediately with an error
//! instead of blocking. Collapsing that into "zero value plus ok flag" shows
//! what a caller actually learns from it.
//!
//! Run with: cargo run --bin ch04_closed_channel

use crossbeam::channel::{bounded, Receiver, RecvError};
use tracing::debug;

/// Receive once, reporting the value (or the default) and whether a value
/// was actually delivered.
fn recv_or_default<T: Default>(rx: &Receiver<T>) -> (T, bool) {
    match rx.recv() {
        Ok(value) => (value, true),
        Err(RecvError) => (T::default(), false),
    }
}

fn receive_after_close() -> (i32, bool) {
    // Rendezvous channel, closed before anything is sent.
    let (tx, rx) = bounded::<i32>(0);
    drop(tx);
    debug!("sender dropped, channel closed");
    recv_or_default(&rx)
}

fn main() {
    feature_demos::telemetry::init(false);

    let (val, ok) = receive_after_close();
    println!("val: {} ok: {}", val, ok);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_channel_yields_default() {
        assert_eq!(receive_after_close(), (0, false));
    }

    #[test]
    fn test_buffered_values_drain_before_close_is_seen() {
        let (tx, rx) = bounded(2);
        tx.send(7).unwrap();
        drop(tx);

        assert_eq!(recv_or_default(&rx), (7, true));
        assert_eq!(recv_or_default(&rx), (0, false));
    }
}
