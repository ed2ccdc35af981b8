//! Race combinator: the first branch to settle decides the outcome.

use super::spawn_branches;
use crate::Cx;
use crate::error::{ContractViolation, SettleResult};
use crate::sync::{SettleOnce, Settled};
use crate::tracing_compat::debug;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future returned by [`race`].
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct Race<T> {
    settled: Settled<(usize, SettleResult<T>)>,
    winner: Option<usize>,
}

impl<T> Race<T> {
    /// Input index of the winning branch, once the race has settled.
    #[must_use]
    pub const fn winner(&self) -> Option<usize> {
        self.winner
    }
}

impl<T> Future for Race<T> {
    type Output = SettleResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.settled).poll(cx).map(|(index, result)| {
            this.winner = Some(index);
            result
        })
    }
}

/// Races `branches`: settles with whichever settles first, success or
/// failure. Later branches keep running; their results are ignored.
///
/// An empty race could never settle and is rejected.
pub fn race<T, F, I>(cx: &Cx, branches: I) -> Result<Race<T>, ContractViolation>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = SettleResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut branches = branches.into_iter().peekable();
    if branches.peek().is_none() {
        return Err(ContractViolation::EmptyRace);
    }
    let slot = SettleOnce::new();
    let sender = slot.clone();
    spawn_branches(cx, branches, move |index, result| {
        if sender.settle((index, result)).is_ok() {
            debug!(winner = index, "race settled");
        }
    });
    Ok(Race {
        settled: slot.wait(),
        winner: None,
    })
}
