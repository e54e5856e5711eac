//! Test Logging Support
//!
//! Installs a tracing subscriber once per test binary so `RUST_LOG=debug`
//! surfaces instrumentation output during test runs.

use once_cell::sync::Lazy;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static TRACING: Lazy<()> = Lazy::new(|| {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_test_writer(),
        )
        .init();
});

/// Initializes the tracing subscriber for a test binary.
///
/// Safe to call from every test; the subscriber is installed exactly once.
pub fn init_test_tracing() {
    Lazy::force(&TRACING);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
        tracing::debug!("logging initialized for tests");
    }
}
