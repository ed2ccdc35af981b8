//! Shared helpers for integration tests.

#![allow(dead_code)]

pub use settle::test_utils::init_test_logging;
pub use settle::{assert_with_log, test_complete, test_phase};

use settle::util::ScriptedEntropy;
use settle::{Runtime, SimulatedCall};
use std::sync::Arc;
use std::time::Duration;

/// Virtual-time runtime with seeded entropy.
pub fn seeded_runtime(seed: u64) -> Runtime {
    Runtime::builder().virtual_time().seed(seed).build()
}

/// Virtual-time runtime whose success draws come from `draws`, in settle
/// order. A draw below a call's success probability succeeds.
pub fn scripted_runtime(draws: &[f64]) -> Runtime {
    Runtime::builder()
        .virtual_time()
        .entropy(Arc::new(ScriptedEntropy::new(draws.to_vec())))
        .build()
}

/// A simulated call with a delay in whole milliseconds.
pub fn call(delay_ms: u64, success_probability: f64) -> SimulatedCall {
    SimulatedCall::new(Duration::from_millis(delay_ms), success_probability)
        .expect("valid simulated call")
}
