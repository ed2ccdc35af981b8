//! Deadline for a single operation.

use crate::Cx;
use crate::error::{Failure, SettleResult};
use crate::time::Sleep;
use crate::tracing_compat::debug;
use crate::types::{CancelReason, Time};
use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// Future returned by [`timeout`].
#[pin_project]
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct Timeout<F> {
    #[pin]
    future: F,
    sleep: Sleep,
}

impl<F> Timeout<F> {
    /// Instant at which the operation is abandoned.
    #[must_use]
    pub const fn deadline(&self) -> Time {
        self.sleep.deadline()
    }

    /// Returns the wrapped future.
    pub fn into_inner(self) -> F {
        self.future
    }
}

impl<T, F> Future for Timeout<F>
where
    F: Future<Output = SettleResult<T>>,
{
    type Output = SettleResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if let Poll::Ready(result) = this.future.poll(cx) {
            return Poll::Ready(result);
        }
        match Pin::new(&mut *this.sleep).poll(cx) {
            Poll::Ready(()) => {
                debug!(deadline = ?this.sleep.deadline(), "operation timed out");
                Poll::Ready(Err(Failure::Cancelled(CancelReason::timeout())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Settles with `future`'s result, or with a timeout cancellation if
/// `duration` elapses first.
///
/// A result available in the same poll as the deadline wins. The inner
/// future is dropped on timeout.
pub fn timeout<F>(cx: &Cx, duration: Duration, future: F) -> Timeout<F> {
    Timeout {
        future,
        sleep: cx.sleep(duration),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::remote::SimulatedCall;
    use crate::runtime::Runtime;
    use crate::types::CancelKind;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn slow_operation_times_out() {
        init_test("slow_operation_times_out");
        let runtime = Runtime::builder().seed(3).build();
        let cx = runtime.cx();
        let call = SimulatedCall::new(Duration::from_secs(5), 1.0).unwrap();
        let result = runtime.block_on(timeout(&cx, Duration::from_millis(100), call.call(&cx, 1)));
        let failure = result.unwrap_err();
        assert_eq!(failure.kind(), FailureKind::Cancelled);
        assert_eq!(failure.cancel_kind(), Some(CancelKind::Timeout));
        assert_eq!(runtime.now(), Time::from_millis(100));
        crate::test_complete!("slow_operation_times_out");
    }

    #[test]
    fn fast_operation_keeps_its_result() {
        init_test("fast_operation_keeps_its_result");
        let runtime = Runtime::builder().seed(3).build();
        let cx = runtime.cx();
        let call = SimulatedCall::new(Duration::from_millis(20), 1.0).unwrap();
        let guarded = timeout(&cx, Duration::from_millis(100), call.call(&cx, "ok"));
        assert_eq!(guarded.deadline(), Time::from_millis(100));
        assert_eq!(runtime.block_on(guarded), Ok("ok"));
        assert_eq!(runtime.now(), Time::from_millis(20));
    }
}
