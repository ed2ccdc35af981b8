//! The measurement wrapper future.

use super::Monitor;
use crate::error::{Failure, SettleResult};
use crate::time::TimerDriverHandle;
use crate::types::{CancelReason, Outcome, Time};
use pin_project::{pin_project, pinned_drop};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future returned by [`Monitor::measure`].
///
/// Records exactly one outcome: when the wrapped operation settles, or, if
/// the wrapper is dropped first, a [`CancelKind::Dropped`] failure.
///
/// [`CancelKind::Dropped`]: crate::types::CancelKind::Dropped
#[pin_project(PinnedDrop)]
#[must_use = "futures do nothing unless polled"]
pub struct Measured<F> {
    #[pin]
    future: F,
    monitor: Monitor,
    /// Taken when the outcome is recorded.
    name: Option<String>,
    epoch: u64,
    timer: TimerDriverHandle,
    started: Time,
}

impl<F> Measured<F> {
    pub(super) fn new(
        future: F,
        monitor: Monitor,
        name: String,
        epoch: u64,
        timer: TimerDriverHandle,
        started: Time,
    ) -> Self {
        Self {
            future,
            monitor,
            name: Some(name),
            epoch,
            timer,
            started,
        }
    }
}

impl<F> fmt::Debug for Measured<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Measured")
            .field("name", &self.name)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl<F, T> Future for Measured<F>
where
    F: Future<Output = SettleResult<T>>,
{
    type Output = SettleResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = match this.future.poll(cx) {
            Poll::Ready(result) => result,
            Poll::Pending => return Poll::Pending,
        };
        if let Some(name) = this.name.take() {
            let now = this.timer.now();
            let summary = match &result {
                Ok(_) => Ok(()),
                Err(failure) => Err(failure.clone()),
            };
            let outcome = Outcome::from_result(summary, now.elapsed_since(*this.started), now);
            this.monitor.finish(&name, outcome, *this.epoch);
        }
        Poll::Ready(result)
    }
}

#[pinned_drop]
impl<F> PinnedDrop for Measured<F> {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        if let Some(name) = this.name.take() {
            let now = this.timer.now();
            let outcome = Outcome::from_result(
                Err(Failure::Cancelled(CancelReason::dropped())),
                now.elapsed_since(*this.started),
                now,
            );
            this.monitor.finish(&name, outcome, *this.epoch);
        }
    }
}
