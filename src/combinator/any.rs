//! The `any` combinator: first success wins.

use super::spawn_branches;
use crate::Cx;
use crate::error::{AggregateFailure, Failure, SettleResult};
use crate::sync::{SettleOnce, Settled};
use crate::tracing_compat::{debug, trace};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Future returned by [`any`].
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct Any<T> {
    settled: Settled<SettleResult<T>>,
}

impl<T> Future for Any<T> {
    type Output = SettleResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().settled).poll(cx)
    }
}

struct Rejections {
    reasons: Vec<Option<Failure>>,
    remaining: usize,
}

/// Settles with the first successful value in settle order.
///
/// If every branch fails, settles with [`Failure::Aggregate`] carrying each
/// branch's failure in input order. An empty input settles immediately with
/// an empty aggregate.
pub fn any<T, F, I>(cx: &Cx, branches: I) -> Any<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = SettleResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let branches: Vec<F> = branches.into_iter().collect();
    let slot = SettleOnce::new();
    let settled = slot.wait();
    if branches.is_empty() {
        let empty = Failure::Aggregate(AggregateFailure::new(Vec::new()));
        if slot.settle(Err(empty)).is_ok() {
            debug!("any settled with no branches");
        }
        return Any { settled };
    }

    let rejections = Arc::new(Mutex::new(Rejections {
        reasons: branches.iter().map(|_| None).collect(),
        remaining: branches.len(),
    }));
    spawn_branches(cx, branches, move |index, result| match result {
        Ok(value) => {
            if slot.settle(Ok(value)).is_ok() {
                debug!(winner = index, "any settled with a success");
            } else {
                trace!(branch = index, "any already settled; success discarded");
            }
        }
        Err(failure) => {
            let mut state = rejections.lock();
            state.reasons[index] = Some(failure);
            state.remaining -= 1;
            if state.remaining == 0 {
                let reasons = state.reasons.drain(..).flatten().collect();
                drop(state);
                let aggregate = AggregateFailure::new(reasons);
                if slot.settle(Err(Failure::Aggregate(aggregate))).is_ok() {
                    debug!("any settled: every branch failed");
                }
            }
        }
    });
    Any { settled }
}
