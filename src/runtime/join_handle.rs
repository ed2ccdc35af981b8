use crate::sync::SettleOnce;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Awaits the output of a spawned task.
///
/// Dropping the handle detaches the task: it keeps running to completion and
/// its output is discarded.
#[must_use = "dropping a JoinHandle detaches the task"]
#[derive(Debug)]
pub struct JoinHandle<T> {
    slot: SettleOnce<T>,
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(slot: SettleOnce<T>) -> Self {
        Self { slot }
    }

    /// Returns true once the task has produced its output.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.slot.is_settled()
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        self.slot.poll_take(cx)
    }
}
