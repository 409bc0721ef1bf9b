//! Observable value cell with change notification.
//!
//! An [`Observer<T>`] owns a value behind a lock and a [`Notifier<T>`].
//! Reads copy the value out or borrow it for the length of a closure.
//! Writes go through a [`Proxy`], which compares the value on release and
//! notifies exactly once if it differs from the value it started with.
//!
//! # Invariants
//!
//! 1. One edit notifies at most once, and only if the value changed
//!    according to `PartialEq`.
//! 2. The version grows by one per notifying edit.
//! 3. Subscribers run after the lock is released, so they may read the
//!    observer (or edit it) freely.
//!
//! Holding a [`Proxy`] while calling [`Observer::get`] on the same thread
//! deadlocks: the lock is not reentrant.

use super::notifier::{Dispatch, Notifier, Subscription};
use crate::sync::{UnfairMutex, UnfairMutexGuard};

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

struct Inner<T> {
    value: UnfairMutex<T>,
    notifier: Notifier<T>,
    version: AtomicU64,
}

/// A shared value that notifies its subscribers when it changes.
///
/// Cloning an `Observer` creates a new handle to the **same** cell.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use weft::{Dispatch, Observer};
///
/// let calls = Arc::new(AtomicUsize::new(0));
/// let name = Observer::new(String::from("ada"));
///
/// let counter = calls.clone();
/// let _sub = name.subscribe(Dispatch::Synchronous, move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// name.edit().push_str(" lovelace");
/// name.set(String::from("ada lovelace"));
///
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
/// assert_eq!(name.version(), 1);
/// ```
pub struct Observer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Observer<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: UnfairMutex::new(value),
                notifier: Notifier::new(),
                version: AtomicU64::new(0),
            }),
        }
    }

    /// Returns a clone of the current value.
    pub fn get(&self) -> T {
        self.inner.value.lock().clone()
    }

    /// Borrows the current value for the duration of `f`.
    ///
    /// The lock is held while `f` runs.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.lock())
    }

    /// Number of edits that changed the value.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Locks the value for editing.
    ///
    /// Subscribers are notified when the proxy is dropped, if the value
    /// changed.
    pub fn edit(&self) -> Proxy<'_, T> {
        let guard = self.inner.value.lock();
        let before = guard.clone();

        Proxy {
            inner: &self.inner,
            guard: Some(guard),
            before,
        }
    }

    /// Replaces the value, notifying if it differs from the current one.
    pub fn set(&self, value: T) {
        *self.edit() = value;
    }

    /// Registers `callback` for every change of the value.
    pub fn subscribe<F>(&self, dispatch: Dispatch, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.notifier.subscribe(dispatch, callback)
    }

    /// The notifier behind this observer, for [`Notifier::wait_for`].
    pub fn notifier(&self) -> &Notifier<T> {
        &self.inner.notifier
    }

    fn downgrade(&self) -> Weak<Inner<T>> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(inner: &Weak<Inner<T>>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }
}

impl<T: Default + Clone + PartialEq + Send + 'static> Default for Observer<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("value", &*self.inner.value.lock())
            .field("version", &self.inner.version.load(Ordering::Relaxed))
            .finish()
    }
}

/// Exclusive write access to an [`Observer`]'s value.
///
/// Created by [`Observer::edit`].
#[must_use = "dropping the proxy immediately publishes nothing"]
pub struct Proxy<'a, T: Clone + PartialEq + Send + 'static> {
    inner: &'a Inner<T>,
    guard: Option<UnfairMutexGuard<'a, T>>,
    before: T,
}

impl<T: Clone + PartialEq + Send + 'static> Deref for Proxy<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.guard {
            Some(guard) => &**guard,
            None => unreachable!("proxy guard is only taken on drop"),
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> DerefMut for Proxy<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.guard {
            Some(guard) => &mut **guard,
            None => unreachable!("proxy guard is only taken on drop"),
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> Drop for Proxy<'_, T> {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };

        if *guard == self.before {
            return;
        }

        self.inner.version.fetch_add(1, Ordering::AcqRel);
        let published = guard.clone();
        drop(guard);

        self.inner.notifier.notify(&published);
    }
}

/// Keeps two observers in sync. Dropping it unlinks them.
#[must_use = "dropping a Link unlinks immediately"]
pub struct Link {
    _forward: Subscription,
    _backward: Subscription,
}

impl Link {
    /// Unlinks now. Same as dropping.
    pub fn unlink(self) {}
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Links `a` and `b` so a change to either is copied into the other.
///
/// `b` first receives `a`'s current value. A change travels across the
/// link once: the write it causes on the other side does not bounce back.
/// The link holds both observers weakly.
///
/// # Examples
///
/// ```
/// use weft::{Observer, link};
///
/// let celsius = Observer::new(0);
/// let mirror = Observer::new(-1);
/// let _link = link(&celsius, &mirror);
///
/// assert_eq!(mirror.get(), 0);
/// mirror.set(21);
/// assert_eq!(celsius.get(), 21);
/// ```
pub fn link<T>(a: &Observer<T>, b: &Observer<T>) -> Link
where
    T: Clone + PartialEq + Send + 'static,
{
    b.set(a.get());

    let busy = Arc::new(AtomicBool::new(false));

    Link {
        _forward: forward(a, b, busy.clone()),
        _backward: forward(b, a, busy),
    }
}

fn forward<T>(from: &Observer<T>, to: &Observer<T>, busy: Arc<AtomicBool>) -> Subscription
where
    T: Clone + PartialEq + Send + 'static,
{
    let to = to.downgrade();

    from.subscribe(Dispatch::Synchronous, move |value| {
        if busy.swap(true, Ordering::AcqRel) {
            return;
        }

        let _reset = Reset(&busy);
        if let Some(to) = Observer::upgrade(&to) {
            to.set(value.clone());
        }
    })
}

/// Clears the link's busy flag, also when a subscriber panics.
struct Reset<'a>(&'a AtomicBool);

impl Drop for Reset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
