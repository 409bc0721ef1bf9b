use crate::error::{Error, Result};
use crate::time::sleep::{Sleep, sleep};

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// Requires `future` to complete within `duration`.
///
/// Resolves to the future's output, or to [`Error::Elapsed`] if the timer
/// fires first. Whichever side loses is dropped as soon as the other one
/// completes: an expired future is destroyed, a completed one cancels the
/// timer.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use weft::{Loop, time};
///
/// let result = Loop::local().block_on(time::timeout(
///     Duration::from_millis(5),
///     time::sleep(Duration::from_secs(60)),
/// ));
///
/// assert!(result.unwrap_err().is_elapsed());
/// ```
pub fn timeout<F>(duration: Duration, future: F) -> Timeout<F>
where
    F: Future,
{
    Timeout::new(duration, future)
}

/// Future returned by [`timeout`].
#[must_use = "futures do nothing unless awaited"]
pub struct Timeout<F> {
    future: Option<Pin<Box<F>>>,
    sleep: Option<Sleep>,
}

impl<F> Timeout<F> {
    pub(crate) fn new(duration: Duration, future: F) -> Self {
        Timeout {
            future: Some(Box::pin(future)),
            sleep: Some(sleep(duration)),
        }
    }
}

impl<F> Future for Timeout<F>
where
    F: Future,
{
    type Output = Result<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(future) = this.future.as_mut() {
            if let Poll::Ready(value) = future.as_mut().poll(cx) {
                this.future = None;
                this.sleep = None;
                return Poll::Ready(Ok(value));
            }
        }

        if let Some(sleep) = this.sleep.as_mut() {
            if let Poll::Ready(()) = Pin::new(sleep).poll(cx) {
                this.future = None;
                this.sleep = None;
                return Poll::Ready(Err(Error::Elapsed));
            }
        }

        Poll::Pending
    }
}
