//! Helpers shared by the integration suites

use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber once; later calls are no-ops.
///
/// Honours `RUST_LOG`, defaulting to `warn`, like the crate's unit-test setup.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}
