//! Combinators over settling operations.
//!
//! - [`race`]: first branch to settle wins, success or failure
//! - [`all`](mod@join): every branch must succeed; values in input order
//! - [`any`](mod@any): first success wins; failures aggregate in input order
//! - [`retry`]: sequential attempts with exponential backoff
//! - [`timeout`]: add a deadline to an operation
//!
//! `race`, `all` and `any` spawn each branch as a detached task on the
//! [`Cx`]'s runtime and settle from whichever branch completes first in real
//! completion order. Branches that lose keep running in the background, so
//! their side effects (such as measurement) still happen. Ties resolve in
//! input order.

pub mod any;
pub mod join;
pub mod race;
pub mod retry;
pub mod timeout;

pub use any::{Any, any};
pub use join::{All, all};
pub use race::{Race, race};
pub use retry::{
    RetryPolicy, calculate_delay, retry_with_backoff, retry_with_cancel, total_delay_budget,
};
pub use timeout::{Timeout, timeout};

use crate::Cx;
use crate::error::SettleResult;
use std::future::Future;
use std::sync::Arc;

/// Spawns every branch, reporting `(input index, result)` as each settles.
fn spawn_branches<T, F, I>(
    cx: &Cx,
    branches: I,
    on_settle: impl Fn(usize, SettleResult<T>) + Send + Sync + 'static,
) where
    I: IntoIterator<Item = F>,
    F: Future<Output = SettleResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let on_settle = Arc::new(on_settle);
    for (index, branch) in branches.into_iter().enumerate() {
        let on_settle = Arc::clone(&on_settle);
        drop(cx.spawn(async move {
            let result = branch.await;
            on_settle(index, result);
        }));
    }
}
