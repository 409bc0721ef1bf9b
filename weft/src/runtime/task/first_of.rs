use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Waits for the first of several futures of the same type.
///
/// Resolves to the index and output of the first future that completes.
/// The futures are polled in order, so when several are ready at once the
/// lowest index wins. Every other future is dropped right away, which
/// deregisters whatever it was waiting on: losers never resume the task.
///
/// For futures of different types use [`select!`](crate::select).
///
/// # Panics
///
/// Panics if `futures` is empty.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use weft::{Loop, task, time};
///
/// let (index, ()) = Loop::local().block_on(task::first_of([
///     time::sleep(Duration::from_millis(50)),
///     time::sleep(Duration::from_millis(5)),
/// ]));
///
/// assert_eq!(index, 1);
/// ```
pub fn first_of<I>(futures: I) -> FirstOf<I::Item>
where
    I: IntoIterator,
    I::Item: Future,
{
    let futures: Vec<_> = futures.into_iter().map(Box::pin).collect();
    assert!(!futures.is_empty(), "first_of needs at least one future");

    FirstOf { futures }
}

/// Future returned by [`first_of`].
#[must_use = "futures do nothing unless awaited"]
pub struct FirstOf<F> {
    futures: Vec<Pin<Box<F>>>,
}

impl<F: Future> Future for FirstOf<F> {
    type Output = (usize, F::Output);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let ready = this
            .futures
            .iter_mut()
            .enumerate()
            .find_map(|(index, future)| match future.as_mut().poll(cx) {
                Poll::Ready(value) => Some((index, value)),
                Poll::Pending => None,
            });

        match ready {
            Some(ready) => {
                this.futures.clear();
                Poll::Ready(ready)
            }
            None => Poll::Pending,
        }
    }
}

impl<F> fmt::Debug for FirstOf<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirstOf")
            .field("pending", &self.futures.len())
            .finish()
    }
}
