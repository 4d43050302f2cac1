//! Tracing setup for tests.

use tracing_subscriber::EnvFilter;

/// Installs a test-friendly subscriber once per process.
///
/// The filter comes from `RUST_LOG`, defaulting to `warn`. Output goes
/// through the test harness so it is only shown for failing tests.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
