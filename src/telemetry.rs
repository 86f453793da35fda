use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the fmt subscriber used by every demo binary.
///
/// `RUST_LOG` takes precedence. Without it the demos log at `info`, or at
/// `debug` when `verbose` is set.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    // A second init (tests, or a demo calling it twice) is harmless.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_names(true)
                .compact(),
        )
        .try_init();
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "info");
        assert_eq!(default_directive(true), "debug");
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init(false);
        init(true);
    }
}
