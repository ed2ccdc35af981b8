//! Test logging and assertion helpers.
//!
//! Available to unit tests and, through the `test-internals` feature, to the
//! integration tests under `tests/`.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a `tracing-subscriber` fmt subscriber writing to the test
/// harness. Safe to call from every test; only the first call installs.
///
/// Honors `RUST_LOG`, defaulting to `settle=debug`.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("settle=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Logs the start of a test phase.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        ::tracing::info!(test = $name, "=== TEST START ===");
    };
}

/// Logs the successful end of a test.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        ::tracing::info!(test = $name, "=== TEST COMPLETE ===");
    };
}

/// Asserts a condition, logging the expected and actual values on failure.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        if !$cond {
            ::tracing::error!(
                message = $msg,
                expected = ?$expected,
                actual = ?$actual,
                "Assertion failed"
            );
        }
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
