use crate::runtime::main_loop::main_handle;
use crate::sync::UnfairMutex;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};

/// Where a subscriber's callback runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dispatch {
    /// Inline, on the thread that called [`Notifier::notify`].
    #[default]
    Synchronous,

    /// On the main loop's thread, with a clone of the value.
    ///
    /// If no main loop is registered the callback runs inline instead.
    Main,
}

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

struct Subscriber<T> {
    id: u64,
    dispatch: Dispatch,
    callback: Callback<T>,

    /// Cleared on unsubscribe. Main-loop deliveries queued earlier check
    /// it before calling back.
    alive: AtomicBool,
}

/// Object-safe view of a notifier, so [`Subscription`] is not generic.
trait Registry: Send + Sync {
    fn remove(&self, id: u64) -> bool;
    fn contains(&self, id: u64) -> bool;
}

struct Inner<T> {
    subscribers: UnfairMutex<Vec<Arc<Subscriber<T>>>>,
    next_id: AtomicU64,
}

impl<T: 'static> Registry for Inner<T> {
    fn remove(&self, id: u64) -> bool {
        let removed = {
            let mut subscribers = self.subscribers.lock();
            subscribers
                .iter()
                .position(|s| s.id == id)
                .map(|index| subscribers.remove(index))
        };

        // Dropped here, outside the lock.
        match removed {
            Some(subscriber) => {
                subscriber.alive.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    fn contains(&self, id: u64) -> bool {
        self.subscribers.lock().iter().any(|s| s.id == id)
    }
}

/// A multi-subscriber broadcast point.
///
/// Each call to [`notify`](Notifier::notify) takes a snapshot of the
/// subscriber list, releases the lock, then calls every member of the
/// snapshot exactly once. Subscribing or unsubscribing while a
/// notification is being delivered, including from one of its callbacks,
/// only affects later notifications. The exception is a
/// [`Dispatch::Main`] delivery still queued on the main loop: it is
/// skipped once its subscription is gone. A callback may also call
/// `notify` again on the same notifier.
///
/// Clones share the same subscriber list.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use weft::{Dispatch, Notifier};
///
/// let sum = Arc::new(AtomicI32::new(0));
/// let notifier = Notifier::<i32>::new();
///
/// let total = sum.clone();
/// let subscription = notifier.subscribe(Dispatch::Synchronous, move |v| {
///     total.fetch_add(*v, Ordering::SeqCst);
/// });
///
/// notifier.notify(&2);
/// drop(subscription);
/// notifier.notify(&40);
///
/// assert_eq!(sum.load(Ordering::SeqCst), 2);
/// ```
pub struct Notifier<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Notifier<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Notifier<T> {
    /// Creates a notifier with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: UnfairMutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registers `callback` until the returned [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, dispatch: Dispatch, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner.subscribers.lock().push(Arc::new(Subscriber {
            id,
            dispatch,
            callback: Box::new(callback),
            alive: AtomicBool::new(true),
        }));

        let registry: Arc<dyn Registry> = self.inner.clone();

        Subscription {
            registry: Arc::downgrade(&registry),
            id,
        }
    }

    /// Delivers `value` to every current subscriber.
    pub fn notify(&self, value: &T) {
        let snapshot = self.inner.subscribers.lock().clone();

        tracing::trace!(subscribers = snapshot.len(), "notify");

        for subscriber in snapshot {
            match subscriber.dispatch {
                Dispatch::Synchronous => (subscriber.callback)(value),
                Dispatch::Main => match main_handle() {
                    Some(main) => {
                        let value = value.clone();
                        main.post(move || {
                            if subscriber.alive.load(Ordering::Acquire) {
                                (subscriber.callback)(&value);
                            }
                        });
                    }
                    None => {
                        tracing::warn!(
                            subscriber = subscriber.id,
                            "no main loop registered, delivering inline"
                        );
                        (subscriber.callback)(value);
                    }
                },
            }
        }
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits for the next notification and resolves to its value.
    ///
    /// The future subscribes when it is first polled; notifications sent
    /// before that are not seen. Dropping it unsubscribes.
    pub fn wait(&self) -> WaitFor<T, fn(&T) -> bool> {
        self.wait_for(any::<T> as fn(&T) -> bool)
    }

    /// Waits for the first notification whose value satisfies `predicate`.
    pub fn wait_for<P>(&self, predicate: P) -> WaitFor<T, P>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        WaitFor {
            notifier: self.clone(),
            predicate: Some(predicate),
            armed: None,
        }
    }
}

fn any<T>(_: &T) -> bool {
    true
}

impl<T: Clone + Send + 'static> Default for Notifier<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Notifier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.inner.subscribers.lock().len())
            .finish()
    }
}

/// Keeps a callback registered with a [`Notifier`].
///
/// Dropping it unsubscribes. A synchronous delivery already in progress
/// may still call the callback once. Deliveries queued on the main loop
/// are skipped, as are all later notifications.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<dyn Registry>,
    id: u64,
}

impl Subscription {
    /// Returns `true` while the callback is still registered.
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(self.id))
    }

    /// Unsubscribes now. Same as dropping.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

struct Slot<T> {
    value: Option<T>,
    waker: Option<Waker>,
}

/// Future returned by [`Notifier::wait`] and [`Notifier::wait_for`].
#[must_use = "futures do nothing unless awaited"]
pub struct WaitFor<T, P> {
    notifier: Notifier<T>,
    predicate: Option<P>,
    armed: Option<(Subscription, Arc<UnfairMutex<Slot<T>>>)>,
}

impl<T, P> Unpin for WaitFor<T, P> {}

impl<T, P> Future for WaitFor<T, P>
where
    T: Clone + Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();

        if let Some((_, slot)) = &this.armed {
            let mut slot = slot.lock();

            if let Some(value) = slot.value.take() {
                drop(slot);
                this.armed = None;
                return Poll::Ready(value);
            }

            if !slot.waker.as_ref().is_some_and(|w| w.will_wake(cx.waker())) {
                slot.waker = Some(cx.waker().clone());
            }

            return Poll::Pending;
        }

        let Some(predicate) = this.predicate.take() else {
            panic!("`WaitFor` polled after completion");
        };

        let slot = Arc::new(UnfairMutex::new(Slot {
            value: None,
            waker: Some(cx.waker().clone()),
        }));

        let subscription = {
            let slot = slot.clone();
            this.notifier
                .subscribe(Dispatch::Synchronous, move |value: &T| {
                    let waker = {
                        let mut slot = slot.lock();
                        if slot.value.is_some() || !predicate(value) {
                            return;
                        }
                        slot.value = Some(value.clone());
                        slot.waker.take()
                    };

                    if let Some(waker) = waker {
                        waker.wake();
                    }
                })
        };

        this.armed = Some((subscription, slot));
        Poll::Pending
    }
}

impl<T, P> fmt::Debug for WaitFor<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitFor")
            .field("armed", &self.armed.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    #[test]
    fn delivers_in_subscription_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let notifier = Notifier::<u8>::new();

        let subs: Vec<_> = (0..3)
            .map(|tag| {
                let seen = seen.clone();
                notifier.subscribe(Dispatch::Synchronous, move |v| {
                    seen.lock().unwrap().push((tag, *v));
                })
            })
            .collect();

        notifier.notify(&9);

        assert_eq!(*seen.lock().unwrap(), vec![(0, 9), (1, 9), (2, 9)]);
        assert_eq!(notifier.len(), 3);

        drop(subs);
        assert!(notifier.is_empty());
    }

    #[test]
    fn subscription_outliving_notifier_is_inert() {
        let notifier = Notifier::<()>::new();
        let subscription = notifier.subscribe(Dispatch::Synchronous, |_| {});

        assert!(subscription.is_active());
        drop(notifier);
        assert!(!subscription.is_active());
    }

    #[test]
    fn subscribing_during_delivery_waits_for_next_notify() {
        let notifier = Notifier::<()>::new();
        let late = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicU64::new(0));

        let _outer = {
            let notifier = notifier.clone();
            let late = late.clone();
            let calls = calls.clone();
            notifier.clone().subscribe(Dispatch::Synchronous, move |_| {
                let calls = calls.clone();
                let sub = notifier.subscribe(Dispatch::Synchronous, move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                });
                late.lock().unwrap().push(sub);
            })
        };

        notifier.notify(&());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        notifier.notify(&());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
