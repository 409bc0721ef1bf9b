use super::mutex::UnfairMutex;
use crate::utils::thread_id::{self, NO_THREAD};

use std::cell::{Cell, UnsafeCell};
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

/// A reentrant variant of [`UnfairMutex`].
///
/// The owning thread may lock it again without blocking; the lock is
/// released once every guard taken by the owner has been dropped.
/// Guards only give shared access, because two live guards on the same
/// thread would otherwise alias a `&mut T`.
pub struct RecursiveMutex<T: ?Sized> {
    /// Thread id of the current owner, or `NO_THREAD`.
    owner: AtomicU64,

    /// Reentry depth. Only touched by the owning thread.
    count: UnsafeCell<u32>,

    /// Held by the owner for as long as `count > 0`.
    inner: UnfairMutex<()>,

    data: T,
}

// Safety: `count` is only accessed by the thread that owns
// `inner`, and the data is only shared immutably.
unsafe impl<T: ?Sized + Send> Send for RecursiveMutex<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for RecursiveMutex<T> {}

impl<T> RecursiveMutex<T> {
    /// Creates a new, unlocked recursive mutex.
    pub const fn new(value: T) -> Self {
        Self {
            owner: AtomicU64::new(NO_THREAD),
            count: UnsafeCell::new(0),
            inner: UnfairMutex::new(()),
            data: value,
        }
    }
}

impl<T: ?Sized> RecursiveMutex<T> {
    /// Acquires the lock, reentering if the calling thread already owns it.
    pub fn lock(&self) -> RecursiveMutexGuard<'_, T> {
        let me = thread_id::current();

        if self.owner.load(Ordering::Relaxed) != me {
            std::mem::forget(self.inner.lock());
            self.adopt(me);
        }

        // Safety: we are the owner.
        unsafe { *self.count.get() += 1 };

        RecursiveMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<RecursiveMutexGuard<'_, T>> {
        let me = thread_id::current();

        if self.owner.load(Ordering::Relaxed) != me {
            std::mem::forget(self.inner.try_lock()?);
            self.adopt(me);
        }

        // Safety: we are the owner.
        unsafe { *self.count.get() += 1 };

        Some(RecursiveMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        })
    }

    /// Returns `true` if the calling thread holds the lock.
    pub fn is_locked_by_current_thread(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == thread_id::current()
    }

    fn adopt(&self, me: u64) {
        // Safety: we just took `inner`, so nobody else touches `count`.
        debug_assert_eq!(unsafe { *self.count.get() }, 0);
        self.owner.store(me, Ordering::Relaxed);
    }

    fn release(&self) {
        // Safety: only the owner reaches here.
        unsafe {
            let count = &mut *self.count.get();
            *count -= 1;

            if *count == 0 {
                self.owner.store(NO_THREAD, Ordering::Relaxed);
                // The guard taken in `lock` was leaked on purpose.
                self.inner.force_unlock();
            }
        }
    }
}

/// Shared access to the value inside a [`RecursiveMutex`].
pub struct RecursiveMutexGuard<'a, T: ?Sized> {
    mutex: &'a RecursiveMutex<T>,
    /// The guard must be dropped on the thread that took it.
    _not_send: PhantomData<Cell<()>>,
}

impl<T: ?Sized> Drop for RecursiveMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}

impl<T: ?Sized> Deref for RecursiveMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.mutex.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn same_thread_reenters() {
        let mutex = RecursiveMutex::new(RefCell::new(Vec::new()));

        let outer = mutex.lock();
        outer.borrow_mut().push(1);
        {
            let inner = mutex.lock();
            inner.borrow_mut().push(2);
            assert!(mutex.is_locked_by_current_thread());
        }
        assert!(mutex.is_locked_by_current_thread());
        drop(outer);

        assert!(!mutex.is_locked_by_current_thread());
        assert_eq!(*mutex.lock().borrow(), vec![1, 2]);
    }

    #[test]
    fn other_threads_are_excluded() {
        let mutex = Arc::new(RecursiveMutex::new(AtomicUsize::new(0)));

        let guard = mutex.lock();
        let again = mutex.lock();

        let other = mutex.clone();
        let blocked = thread::spawn(move || other.try_lock().is_none())
            .join()
            .unwrap();
        assert!(blocked);

        drop(again);
        drop(guard);

        let other = mutex.clone();
        let acquired = thread::spawn(move || other.try_lock().is_some())
            .join()
            .unwrap();
        assert!(acquired);
    }
}
