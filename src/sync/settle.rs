//! Single-assignment settle slot.
//!
//! A [`SettleOnce`] accepts exactly one value. Every later offer is rejected
//! and handed back to the caller, which is how join handles and combinators
//! guarantee that an operation settles once, with the first offer winning.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

#[derive(Debug)]
enum Slot<T> {
    Empty,
    Full(T),
    Taken,
}

#[derive(Debug)]
struct State<T> {
    slot: Slot<T>,
    waker: Option<Waker>,
}

/// A shared slot that settles exactly once.
#[derive(Debug)]
pub struct SettleOnce<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for SettleOnce<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Default for SettleOnce<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SettleOnce<T> {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                slot: Slot::Empty,
                waker: None,
            })),
        }
    }

    /// Offers a value.
    ///
    /// Returns `Err(value)` if the slot already settled.
    pub fn settle(&self, value: T) -> Result<(), T> {
        let waker = {
            let mut state = self.state.lock();
            if !matches!(state.slot, Slot::Empty) {
                return Err(value);
            }
            state.slot = Slot::Full(value);
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }

    /// Returns true once a value has been offered and accepted.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(self.state.lock().slot, Slot::Empty)
    }

    /// Takes the value if present, otherwise registers the waker.
    ///
    /// After the value has been taken this stays pending forever.
    pub fn poll_take(&self, cx: &mut Context<'_>) -> Poll<T> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut state.slot, Slot::Taken) {
            Slot::Full(value) => Poll::Ready(value),
            other => {
                state.slot = other;
                match &state.waker {
                    Some(existing) if existing.will_wake(cx.waker()) => {}
                    _ => state.waker = Some(cx.waker().clone()),
                }
                Poll::Pending
            }
        }
    }

    /// A future that resolves with the settled value.
    pub fn wait(&self) -> Settled<T> {
        Settled { slot: self.clone() }
    }
}

/// Future returned by [`SettleOnce::wait`].
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct Settled<T> {
    slot: SettleOnce<T>,
}

impl<T> Future for Settled<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        self.slot.poll_take(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Wake;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn first_offer_wins() {
        crate::test_utils::init_test_logging();
        crate::test_phase!("first_offer_wins");
        let slot = SettleOnce::new();
        assert_eq!(slot.settle(1), Ok(()));
        assert_eq!(slot.settle(2), Err(2));
        assert!(slot.is_settled());
        crate::test_complete!("first_offer_wins");
    }

    #[test]
    fn waiter_is_woken_once_on_settle() {
        crate::test_utils::init_test_logging();
        let slot = SettleOnce::<&str>::new();
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(Arc::clone(&counter));
        let mut cx = Context::from_waker(&waker);

        let mut wait = slot.wait();
        assert!(Pin::new(&mut wait).poll(&mut cx).is_pending());
        slot.settle("done").unwrap();
        let _ = slot.settle("late");
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(Pin::new(&mut wait).poll(&mut cx), Poll::Ready("done"));
    }

    #[test]
    fn taken_slot_still_rejects_offers() {
        crate::test_utils::init_test_logging();
        let slot = SettleOnce::new();
        slot.settle(5).unwrap();
        let waker = Waker::from(Arc::new(CountingWaker(AtomicUsize::new(0))));
        let mut cx = Context::from_waker(&waker);
        assert_eq!(slot.poll_take(&mut cx), Poll::Ready(5));
        assert_eq!(slot.settle(6), Err(6));
        assert!(slot.poll_take(&mut cx).is_pending());
    }
}
