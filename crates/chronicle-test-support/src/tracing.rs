//! Tracing setup for tests.

use tracing_subscriber::EnvFilter;

/// Installs a formatting subscriber that writes through the test harness.
///
/// Filters with `RUST_LOG`, defaulting to `info`. Safe to call from every
/// test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}
