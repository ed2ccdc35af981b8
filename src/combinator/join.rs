//! The `all` combinator: every branch must succeed.

use super::spawn_branches;
use crate::Cx;
use crate::error::SettleResult;
use crate::sync::{SettleOnce, Settled};
use crate::tracing_compat::{debug, trace};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Future returned by [`all`].
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct All<T> {
    settled: Settled<SettleResult<Vec<T>>>,
}

impl<T> Future for All<T> {
    type Output = SettleResult<Vec<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().settled).poll(cx)
    }
}

struct Collected<T> {
    values: Vec<Option<T>>,
    remaining: usize,
}

/// Settles with every branch's value in input order once all succeed, or
/// with the first failure in settle order.
///
/// Branches still running after a failure are not cancelled; their results
/// are discarded. An empty input settles immediately with an empty vector.
pub fn all<T, F, I>(cx: &Cx, branches: I) -> All<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = SettleResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let branches: Vec<F> = branches.into_iter().collect();
    let slot = SettleOnce::new();
    let settled = slot.wait();
    if branches.is_empty() {
        if slot.settle(Ok(Vec::new())).is_ok() {
            debug!("all settled with no branches");
        }
        return All { settled };
    }

    let collected = Arc::new(Mutex::new(Collected {
        values: branches.iter().map(|_| None).collect(),
        remaining: branches.len(),
    }));
    spawn_branches(cx, branches, move |index, result| match result {
        Ok(value) => {
            let mut state = collected.lock();
            state.values[index] = Some(value);
            state.remaining -= 1;
            if state.remaining == 0 {
                let values = state.values.drain(..).flatten().collect();
                drop(state);
                if slot.settle(Ok(values)).is_ok() {
                    debug!("all settled with every value");
                }
            }
        }
        Err(failure) => {
            if slot.settle(Err(failure)).is_ok() {
                debug!(branch = index, "all failing fast");
            } else {
                trace!(branch = index, "all already settled; failure discarded");
            }
        }
    });
    All { settled }
}
