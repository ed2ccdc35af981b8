//! Cancellation tokens driving simulated calls, retries and measurement.

mod common;
use common::*;

use settle::combinator::retry_with_cancel;
use settle::{
    CancelKind, CancelReason, CancellationToken, FailureKind, Monitor, RetryPolicy, Time,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[test]
fn cancel_at_100ms_settles_long_call_as_cancelled() {
    init_test_logging();
    test_phase!("cancel_at_100ms_settles_long_call_as_cancelled");

    let runtime = seeded_runtime(1);
    let cx = runtime.cx();
    let token = CancellationToken::new();
    drop(token.cancel_after(&cx, Duration::from_millis(100)));

    let result = runtime.block_on(call(5_000, 1.0).call_with_cancel(&cx, "payload", &token));
    let failure = result.expect_err("cancelled");
    assert_eq!(failure.kind(), FailureKind::Cancelled);
    assert_eq!(failure.cancel_kind(), Some(CancelKind::Timeout));
    assert_eq!(runtime.now(), Time::from_millis(100));

    test_complete!("cancel_at_100ms_settles_long_call_as_cancelled");
}

#[test]
fn double_cancel_fires_listeners_once_and_keeps_first_reason() {
    init_test_logging();
    test_phase!("double_cancel_fires_listeners_once_and_keeps_first_reason");

    let token = CancellationToken::new();
    let fired = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let fired = Arc::clone(&fired);
        token.on_cancel(move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }

    assert!(token.cancel(CancelReason::user("first")));
    assert!(!token.cancel(CancelReason::timeout()));
    assert_eq!(fired.load(Ordering::SeqCst), 3);
    assert_eq!(token.reason().map(|r| r.kind()), Some(CancelKind::User));

    // Late listeners run immediately with the original reason.
    let late_kind = Arc::new(parking_lot::Mutex::new(None));
    let seen = Arc::clone(&late_kind);
    token.on_cancel(move |reason| *seen.lock() = Some(reason.kind()));
    assert_eq!(*late_kind.lock(), Some(CancelKind::User));

    test_complete!("double_cancel_fires_listeners_once_and_keeps_first_reason");
}

#[test]
fn parent_cancellation_reaches_children_but_not_upward() {
    init_test_logging();
    test_phase!("parent_cancellation_reaches_children_but_not_upward");

    let parent = CancellationToken::new();
    let child = parent.child();
    let grandchild = child.child();

    let sibling = parent.child();
    sibling.cancel(CancelReason::user("sibling only"));
    assert!(!parent.is_cancelled());

    parent.cancel(CancelReason::user("shutdown"));
    assert_eq!(child.reason().map(|r| r.kind()), Some(CancelKind::ParentCancelled));
    assert_eq!(
        grandchild.reason().map(|r| r.kind()),
        Some(CancelKind::ParentCancelled)
    );
    assert_eq!(sibling.reason().map(|r| r.kind()), Some(CancelKind::User));

    test_complete!("parent_cancellation_reaches_children_but_not_upward");
}

#[test]
fn explicit_cancel_beats_pending_cancel_after() {
    init_test_logging();
    test_phase!("explicit_cancel_beats_pending_cancel_after");

    let runtime = seeded_runtime(1);
    let cx = runtime.cx();
    let token = CancellationToken::new();
    let timer = token.cancel_after(&cx, Duration::from_millis(500));

    let canceller = token.clone();
    let sleeper = cx.clone();
    drop(cx.spawn(async move {
        sleeper.sleep(Duration::from_millis(20)).await;
        canceller.cancel(CancelReason::user("operator"));
    }));

    let fired_by_timer = runtime.block_on(timer);
    assert!(!fired_by_timer);
    assert_eq!(token.reason().map(|r| r.kind()), Some(CancelKind::User));
    assert_eq!(runtime.now(), Time::from_millis(20));

    test_complete!("explicit_cancel_beats_pending_cancel_after");
}

#[test]
fn cancelled_measurement_is_recorded_as_failure() {
    init_test_logging();
    test_phase!("cancelled_measurement_is_recorded_as_failure");

    let runtime = seeded_runtime(4);
    let cx = runtime.cx();
    let monitor = Monitor::new();
    let token = CancellationToken::new();
    drop(token.cancel_after(&cx, Duration::from_millis(100)));

    let long = call(5_000, 1.0);
    let result = runtime.block_on(
        monitor.measure(&cx, "long", || long.call_with_cancel(&cx, (), &token)),
    );
    assert!(result.is_err());

    let stats = monitor.stats("long").expect("recorded");
    assert_eq!(stats.total, 1);
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.average_duration, None);
    let counters = monitor.counters("long").expect("counters");
    assert_eq!(counters.cancellations, 1);

    test_complete!("cancelled_measurement_is_recorded_as_failure");
}

#[test]
fn dropped_measurement_records_a_dropped_cancellation() {
    init_test_logging();
    test_phase!("dropped_measurement_records_a_dropped_cancellation");

    let runtime = seeded_runtime(4);
    let cx = runtime.cx();
    let monitor = Monitor::new();
    let long = call(1_000, 1.0);
    let measured = monitor.measure(&cx, "abandoned", || long.call(&cx, ()));
    drop(measured);

    let stats = monitor.stats("abandoned").expect("recorded on drop");
    assert_eq!(stats.total, 1);
    let last = stats.recent.last().expect("one outcome");
    assert_eq!(
        last.failure().and_then(|f| f.cancel_kind()),
        Some(CancelKind::Dropped)
    );

    test_complete!("dropped_measurement_records_a_dropped_cancellation");
}

#[test]
fn retry_stops_when_token_fires_between_attempts() {
    init_test_logging();
    test_phase!("retry_stops_when_token_fires_between_attempts");

    // Every attempt fails; the token fires during the second backoff.
    let runtime = seeded_runtime(8);
    let cx = runtime.cx();
    let token = CancellationToken::new();
    drop(token.cancel_after(&cx, Duration::from_millis(250)));
    let flaky = call(10, 0.0);
    let attempts = AtomicUsize::new(0);

    let policy = RetryPolicy::default();
    let result = runtime.block_on(retry_with_cancel(&cx, &policy, &token, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        flaky.call(&cx, ())
    }));

    assert_eq!(
        result.expect_err("cancelled").cancel_kind(),
        Some(CancelKind::Timeout)
    );
    // Attempts at 0ms and 110ms; second backoff (200ms) interrupted at 250ms.
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(runtime.now(), Time::from_millis(250));

    test_complete!("retry_stops_when_token_fires_between_attempts");
}
