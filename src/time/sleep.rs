//! The `Sleep` future.

use super::driver::TimerDriverHandle;
use super::heap::TimerHandle;
use crate::Cx;
use crate::types::Time;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

/// A future that completes once its deadline has been reached.
///
/// The timer registration is made on first poll, refreshed only when the
/// polling task changes, and cancelled when the future is dropped early.
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct Sleep {
    driver: TimerDriverHandle,
    deadline: Time,
    registration: Option<(TimerHandle, Waker)>,
}

impl Sleep {
    /// Creates a sleep on `driver` that completes at `deadline`.
    pub fn until(driver: TimerDriverHandle, deadline: Time) -> Self {
        Self {
            driver,
            deadline,
            registration: None,
        }
    }

    /// Creates a sleep on `driver` that completes `duration` from now.
    pub fn after(driver: TimerDriverHandle, duration: Duration) -> Self {
        let deadline = driver.now() + duration;
        Self::until(driver, deadline)
    }

    /// The instant this sleep completes.
    #[must_use]
    pub const fn deadline(&self) -> Time {
        self.deadline
    }

    /// Returns true once the deadline has passed.
    #[must_use]
    pub fn is_elapsed(&self) -> bool {
        self.driver.now() >= self.deadline
    }

    /// Moves the deadline, keeping the current registration's waker.
    pub fn reset(&mut self, deadline: Time) {
        self.deadline = deadline;
        if let Some((handle, waker)) = self.registration.take() {
            let handle = self.driver.update(&handle, deadline, waker.clone());
            self.registration = Some((handle, waker));
        }
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.driver.now() >= this.deadline {
            if let Some((handle, _)) = this.registration.take() {
                this.driver.cancel(&handle);
            }
            return Poll::Ready(());
        }

        match this.registration.take() {
            Some((handle, waker)) if waker.will_wake(cx.waker()) => {
                this.registration = Some((handle, waker));
            }
            Some((handle, _)) => {
                let waker = cx.waker().clone();
                let handle = this.driver.update(&handle, this.deadline, waker.clone());
                this.registration = Some((handle, waker));
            }
            None => {
                let waker = cx.waker().clone();
                let handle = this.driver.register(this.deadline, waker.clone());
                this.registration = Some((handle, waker));
            }
        }
        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some((handle, _)) = self.registration.take() {
            self.driver.cancel(&handle);
        }
    }
}

/// Sleeps for `duration` on the context's timer driver.
pub fn sleep(cx: &Cx, duration: Duration) -> Sleep {
    Sleep::after(cx.timer().clone(), duration)
}

/// Sleeps until `deadline` on the context's timer driver.
pub fn sleep_until(cx: &Cx, deadline: Time) -> Sleep {
    Sleep::until(cx.timer().clone(), deadline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::VirtualClock;
    use std::sync::Arc;
    use std::task::Wake;

    struct Noop;

    impl Wake for Noop {
        fn wake(self: Arc<Self>) {}
    }

    #[test]
    fn pending_until_deadline_then_ready() {
        crate::test_utils::init_test_logging();
        crate::test_phase!("pending_until_deadline_then_ready");
        let clock = Arc::new(VirtualClock::new());
        let driver = TimerDriverHandle::with_virtual_clock(Arc::clone(&clock));
        let waker = Waker::from(Arc::new(Noop));
        let mut cx = Context::from_waker(&waker);

        let mut sleep = Sleep::after(driver.clone(), Duration::from_millis(100));
        assert!(Pin::new(&mut sleep).poll(&mut cx).is_pending());
        assert_eq!(driver.pending_count(), 1);

        // A second poll with the same waker keeps the single registration.
        assert!(Pin::new(&mut sleep).poll(&mut cx).is_pending());
        assert_eq!(driver.pending_count(), 1);

        clock.advance_to(Time::from_millis(100));
        assert!(Pin::new(&mut sleep).poll(&mut cx).is_ready());
        assert_eq!(driver.pending_count(), 0);
        crate::test_complete!("pending_until_deadline_then_ready");
    }

    #[test]
    fn drop_cancels_registration() {
        crate::test_utils::init_test_logging();
        let clock = Arc::new(VirtualClock::new());
        let driver = TimerDriverHandle::with_virtual_clock(clock);
        let waker = Waker::from(Arc::new(Noop));
        let mut cx = Context::from_waker(&waker);

        let mut sleep = Sleep::after(driver.clone(), Duration::from_secs(5));
        assert!(Pin::new(&mut sleep).poll(&mut cx).is_pending());
        drop(sleep);
        assert_eq!(driver.pending_count(), 0);
    }

    #[test]
    fn zero_duration_is_immediately_ready() {
        crate::test_utils::init_test_logging();
        let driver = TimerDriverHandle::with_virtual_clock(Arc::new(VirtualClock::new()));
        let waker = Waker::from(Arc::new(Noop));
        let mut cx = Context::from_waker(&waker);
        let mut sleep = Sleep::after(driver.clone(), Duration::ZERO);
        assert!(sleep.is_elapsed());
        assert!(Pin::new(&mut sleep).poll(&mut cx).is_ready());
        assert_eq!(driver.pending_count(), 0);
    }

    #[test]
    fn reset_moves_deadline() {
        crate::test_utils::init_test_logging();
        let clock = Arc::new(VirtualClock::new());
        let driver = TimerDriverHandle::with_virtual_clock(Arc::clone(&clock));
        let waker = Waker::from(Arc::new(Noop));
        let mut cx = Context::from_waker(&waker);

        let mut sleep = Sleep::after(driver.clone(), Duration::from_millis(10));
        assert!(Pin::new(&mut sleep).poll(&mut cx).is_pending());
        sleep.reset(Time::from_millis(50));
        assert_eq!(driver.next_deadline(), Some(Time::from_millis(50)));

        clock.advance_to(Time::from_millis(20));
        assert!(Pin::new(&mut sleep).poll(&mut cx).is_pending());
        clock.advance_to(Time::from_millis(50));
        assert!(Pin::new(&mut sleep).poll(&mut cx).is_ready());
    }
}
