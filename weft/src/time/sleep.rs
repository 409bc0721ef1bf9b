use crate::reactor::{Loop, TimerToken, deadline_after};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

/// Creates a future that completes after the given duration.
///
/// The timer is registered with the current thread's loop on first poll
/// and cancelled if the future is dropped before it fires.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
///
/// sleep(Duration::from_millis(10)).await;
/// ```
///
/// Durations too large for an [`Instant`] are clamped to about thirty
/// years, so `Duration::MAX` sleeps forever in practice.
pub fn sleep(duration: Duration) -> Sleep {
    Sleep::new(deadline_after(Instant::now(), duration))
}

/// Creates a future that completes at `deadline`.
pub fn sleep_until(deadline: Instant) -> Sleep {
    Sleep::new(deadline)
}

/// State shared between a [`Sleep`] and its timer callback.
struct Shared {
    fired: Cell<bool>,
    waker: RefCell<Option<Waker>>,
}

/// A future that completes once a specific deadline is reached.
///
/// `Sleep` is **cancel-safe**: dropping it cancels its timer, so the
/// task that awaited it is never resumed by it.
#[must_use = "futures do nothing unless awaited"]
pub struct Sleep {
    /// Absolute point in time when the sleep completes.
    deadline: Instant,

    /// The registered timer, once polled.
    timer: Option<(TimerToken, Rc<Shared>)>,
}

impl Sleep {
    pub(crate) fn new(deadline: Instant) -> Self {
        Self {
            deadline,
            timer: None,
        }
    }

    /// The instant this sleep completes at.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Returns `true` once the deadline has been reached.
    pub fn is_elapsed(&self) -> bool {
        match &self.timer {
            Some((_, shared)) => shared.fired.get(),
            None => Instant::now() >= self.deadline,
        }
    }
}

impl Future for Sleep {
    type Output = ();

    /// On the first poll, the timer is registered with the loop. The task
    /// is woken from the timer callback once the deadline is reached.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match &this.timer {
            Some((_, shared)) => {
                if shared.fired.get() {
                    return Poll::Ready(());
                }

                let mut waker = shared.waker.borrow_mut();
                if !waker.as_ref().is_some_and(|w| w.will_wake(cx.waker())) {
                    *waker = Some(cx.waker().clone());
                }

                Poll::Pending
            }
            None => {
                if Instant::now() >= this.deadline {
                    return Poll::Ready(());
                }

                let shared = Rc::new(Shared {
                    fired: Cell::new(false),
                    waker: RefCell::new(Some(cx.waker().clone())),
                });

                let callback = {
                    let shared = shared.clone();
                    move || {
                        shared.fired.set(true);
                        if let Some(waker) = shared.waker.borrow_mut().take() {
                            waker.wake();
                        }
                    }
                };

                let token = Loop::local().schedule_timer(this.deadline, None, callback);
                this.timer = Some((token, shared));

                Poll::Pending
            }
        }
    }
}

impl fmt::Debug for Sleep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sleep")
            .field("deadline", &self.deadline)
            .field("registered", &self.timer.is_some())
            .finish()
    }
}
