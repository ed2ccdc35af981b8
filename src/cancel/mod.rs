//! Cooperative cancellation.
//!
//! A [`CancellationToken`] starts active and is cancelled at most once. The
//! first [`cancel`](CancellationToken::cancel) wins: it records the
//! [`CancelReason`], runs every registered listener once in registration
//! order, and wakes every pending [`Cancelled`] future. Later calls are
//! no-ops.
//!
//! Tokens are advisory. Work observes them by racing against
//! [`cancelled`](CancellationToken::cancelled), usually through
//! [`run_until_cancelled`](CancellationToken::run_until_cancelled).

use crate::Cx;
use crate::runtime::JoinHandle;
use crate::tracing_compat::debug;
use crate::types::CancelReason;
use parking_lot::Mutex;
use pin_project::pin_project;
use slab::Slab;
use smallvec::SmallVec;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

type Listener = Box<dyn FnOnce(&CancelReason) + Send>;

struct State {
    reason: Option<CancelReason>,
    listeners: SmallVec<[Listener; 4]>,
    wakers: Slab<Waker>,
}

struct Inner {
    state: Mutex<State>,
}

/// A shareable, single-fire cancellation signal.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CancellationToken")
            .field("reason", &state.reason)
            .field("listeners", &state.listeners.len())
            .field("waiters", &state.wakers.len())
            .finish()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Creates an active token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    reason: None,
                    listeners: SmallVec::new(),
                    wakers: Slab::new(),
                }),
            }),
        }
    }

    /// Cancels the token.
    ///
    /// Returns true if this call performed the transition. Listeners run on
    /// the calling thread, in registration order, after the internal lock is
    /// released.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let (listeners, wakers) = {
            let mut state = self.inner.state.lock();
            if state.reason.is_some() {
                return false;
            }
            state.reason = Some(reason);
            let listeners = std::mem::take(&mut state.listeners);
            let wakers: SmallVec<[Waker; 4]> = state.wakers.drain().collect();
            (listeners, wakers)
        };
        debug!(
            %reason,
            listeners = listeners.len(),
            waiters = wakers.len(),
            "token cancelled"
        );
        for listener in listeners {
            listener(&reason);
        }
        for waker in wakers {
            waker.wake();
        }
        true
    }

    /// Registers a listener that runs once when the token is cancelled.
    ///
    /// If the token is already cancelled the listener runs immediately.
    pub fn on_cancel<F>(&self, listener: F)
    where
        F: FnOnce(&CancelReason) + Send + 'static,
    {
        let reason = {
            let mut state = self.inner.state.lock();
            match state.reason {
                Some(reason) => reason,
                None => {
                    state.listeners.push(Box::new(listener));
                    return;
                }
            }
        };
        listener(&reason);
    }

    /// Returns true once the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().reason.is_some()
    }

    /// The reason given by the winning `cancel` call.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.state.lock().reason
    }

    /// A future that resolves with the reason once the token is cancelled.
    pub fn cancelled(&self) -> Cancelled {
        Cancelled {
            token: self.clone(),
            key: None,
        }
    }

    /// Creates a dependent token, cancelled with
    /// [`CancelKind::ParentCancelled`](crate::types::CancelKind) when this
    /// one is. Cancelling the child does not affect the parent.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self::new();
        let weak = Arc::downgrade(&child.inner);
        self.on_cancel(move |_| {
            if let Some(inner) = weak.upgrade() {
                Self { inner }.cancel(CancelReason::parent_cancelled());
            }
        });
        child
    }

    /// Cancels the token with a timeout reason after `duration`, unless it
    /// is cancelled first.
    ///
    /// The timer runs as a background task on the context's runtime; the
    /// returned handle may be dropped.
    pub fn cancel_after(&self, cx: &Cx, duration: Duration) -> JoinHandle<bool> {
        let token = self.clone();
        let sleep = cx.sleep(duration);
        cx.spawn(async move {
            match token.run_until_cancelled(sleep).await {
                Ok(()) => token.cancel(CancelReason::timeout()),
                Err(_) => false,
            }
        })
    }

    /// Drives `future` unless the token fires first.
    ///
    /// The token is checked before the future on every poll, so a
    /// cancellation observed in the same poll as completion wins.
    pub fn run_until_cancelled<F: Future>(&self, future: F) -> RunUntilCancelled<F> {
        RunUntilCancelled {
            future,
            cancelled: self.cancelled(),
        }
    }

    fn poll_reason(&self, key: &mut Option<usize>, cx: &mut Context<'_>) -> Poll<CancelReason> {
        let mut state = self.inner.state.lock();
        if let Some(reason) = state.reason {
            *key = None;
            return Poll::Ready(reason);
        }
        if let Some(existing) = key.and_then(|k| state.wakers.get_mut(k)) {
            if !existing.will_wake(cx.waker()) {
                *existing = cx.waker().clone();
            }
            return Poll::Pending;
        }
        *key = Some(state.wakers.insert(cx.waker().clone()));
        Poll::Pending
    }

    fn forget_waiter(&self, key: usize) {
        let mut state = self.inner.state.lock();
        if state.reason.is_none() {
            state.wakers.try_remove(key);
        }
    }
}

/// Future returned by [`CancellationToken::cancelled`].
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct Cancelled {
    token: CancellationToken,
    key: Option<usize>,
}

impl Future for Cancelled {
    type Output = CancelReason;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<CancelReason> {
        let this = self.get_mut();
        this.token.poll_reason(&mut this.key, cx)
    }
}

impl Drop for Cancelled {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.token.forget_waiter(key);
        }
    }
}

/// Future returned by [`CancellationToken::run_until_cancelled`].
#[pin_project]
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct RunUntilCancelled<F> {
    #[pin]
    future: F,
    cancelled: Cancelled,
}

impl<F: Future> Future for RunUntilCancelled<F> {
    type Output = Result<F::Output, CancelReason>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if let Poll::Ready(reason) = Pin::new(&mut *this.cancelled).poll(cx) {
            return Poll::Ready(Err(reason));
        }
        this.future.poll(cx).map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::types::{CancelKind, Time};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn double_cancel_fires_listeners_once() {
        init_test("double_cancel_fires_listeners_once");
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        token.on_cancel(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(token.cancel(CancelReason::user("first")));
        assert!(!token.cancel(CancelReason::user("second")));
        let fired = calls.load(Ordering::SeqCst);
        crate::assert_with_log!(fired == 1, "listener fired once", 1, fired);
        assert_eq!(token.reason(), Some(CancelReason::user("first")));
        crate::test_complete!("double_cancel_fires_listeners_once");
    }

    #[test]
    fn listeners_run_in_registration_order() {
        init_test("listeners_run_in_registration_order");
        let token = CancellationToken::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = Arc::clone(&order);
            token.on_cancel(move |_| order.lock().push(i));
        }
        token.cancel(CancelReason::default());
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn late_listener_fires_immediately() {
        init_test("late_listener_fires_immediately");
        let token = CancellationToken::new();
        token.cancel(CancelReason::timeout());
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        token.on_cancel(move |reason| *slot.lock() = Some(reason.kind));
        assert_eq!(*seen.lock(), Some(CancelKind::Timeout));
    }

    #[test]
    fn listener_may_reenter_token() {
        init_test("listener_may_reenter_token");
        let token = CancellationToken::new();
        let inner = token.clone();
        let nested = Arc::new(AtomicUsize::new(0));
        let nested_count = Arc::clone(&nested);
        token.on_cancel(move |_| {
            assert!(!inner.cancel(CancelReason::user("again")));
            let count = Arc::clone(&nested_count);
            inner.on_cancel(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        });
        token.cancel(CancelReason::default());
        assert_eq!(nested.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn child_follows_parent_not_reverse() {
        init_test("child_follows_parent_not_reverse");
        let parent = CancellationToken::new();
        let child = parent.child();
        let sibling = parent.child();

        sibling.cancel(CancelReason::user("sibling only"));
        assert!(!parent.is_cancelled());
        assert!(!child.is_cancelled());

        parent.cancel(CancelReason::user("stop"));
        assert_eq!(
            child.reason().map(|r| r.kind),
            Some(CancelKind::ParentCancelled)
        );
        assert_eq!(sibling.reason(), Some(CancelReason::user("sibling only")));
    }

    #[test]
    fn cancel_after_fires_at_deadline() {
        init_test("cancel_after_fires_at_deadline");
        let runtime = Runtime::new();
        let cx = runtime.cx();
        let token = CancellationToken::new();
        drop(token.cancel_after(&cx, Duration::from_millis(100)));
        let reason = runtime.block_on(token.cancelled());
        assert!(reason.is_timeout());
        crate::assert_with_log!(
            runtime.now() == Time::from_millis(100),
            "timeout fired at deadline",
            Time::from_millis(100),
            runtime.now()
        );
        crate::test_complete!("cancel_after_fires_at_deadline");
    }

    #[test]
    fn cancel_after_is_noop_when_already_cancelled() {
        init_test("cancel_after_is_noop_when_already_cancelled");
        let runtime = Runtime::new();
        let cx = runtime.cx();
        let token = CancellationToken::new();
        let timer = token.cancel_after(&cx, Duration::from_secs(10));
        token.cancel(CancelReason::user("early"));
        let fired = runtime.block_on(timer);
        assert!(!fired);
        assert_eq!(token.reason(), Some(CancelReason::user("early")));
        // The pending sleep was released, so time never advanced.
        assert_eq!(runtime.now(), Time::ZERO);
    }

    #[test]
    fn run_until_cancelled_prefers_cancellation() {
        init_test("run_until_cancelled_prefers_cancellation");
        let runtime = Runtime::new();
        let token = CancellationToken::new();
        token.cancel(CancelReason::user("now"));
        let out = runtime.block_on(token.run_until_cancelled(async { 5 }));
        assert_eq!(out, Err(CancelReason::user("now")));
    }

    #[test]
    fn dropped_waiter_releases_slot() {
        init_test("dropped_waiter_releases_slot");
        let runtime = Runtime::new();
        let cx = runtime.cx();
        let token = CancellationToken::new();
        let sleep_cx = cx.clone();
        let out = runtime.block_on(
            token.run_until_cancelled(async move { sleep_cx.sleep(Duration::from_millis(5)).await }),
        );
        assert_eq!(out, Ok(()));
        assert_eq!(token.inner.state.lock().wakers.len(), 0);
    }
}
