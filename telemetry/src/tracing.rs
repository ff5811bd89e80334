//! Tracing initialization for binaries and tests.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Initializes the global tracing subscriber for a binary.
///
/// `RUST_LOG` takes precedence; `default_directives` is used when it is not
/// set. Panics if a global subscriber was already installed.
pub fn init_tracing(default_directives: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directives.into()))
        .with(fmt::layer())
        .init();

    tracing::debug!(default_directives, "tracing initialized");
}

/// Initializes tracing for tests, capturing output per test.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_test_writer())
        .try_init();
}
