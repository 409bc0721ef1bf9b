use atomic_wait::{wait, wake_one};

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};

/// Nobody holds the lock.
const UNLOCKED: u32 = 0;

/// The lock is held and nobody is sleeping on it.
const LOCKED: u32 = 1;

/// The lock is held and at least one thread may be sleeping on it.
const CONTENDED: u32 = 2;

/// A small exclusive lock with a single-CAS fast path.
///
/// `UnfairMutex<T>` takes the lock with one compare-and-swap when it is
/// free. Under contention the waiter parks on the OS (futex on Linux,
/// `WaitOnAddress` on Windows, ulock on macOS) through `atomic-wait`
/// instead of spinning. Waiters are not queued: whichever thread gets to
/// the atomic first after an unlock wins, so there is no fairness.
///
/// The lock is not reentrant. Locking twice from the same thread
/// deadlocks; use [`RecursiveMutex`](super::RecursiveMutex) for that.
pub struct UnfairMutex<T: ?Sized> {
    /// One of `UNLOCKED`, `LOCKED` or `CONTENDED`.
    state: AtomicU32,

    /// The protected value.
    data: UnsafeCell<T>,
}

// Safety: the lock serialises every access to `data`.
unsafe impl<T: ?Sized + Send> Send for UnfairMutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for UnfairMutex<T> {}

impl<T> UnfairMutex<T> {
    /// Creates a new, unlocked mutex.
    pub const fn new(value: T) -> Self {
        Self {
            state: AtomicU32::new(UNLOCKED),
            data: UnsafeCell::new(value),
        }
    }

    /// Consumes the mutex and returns the protected value.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> UnfairMutex<T> {
    /// Acquires the lock, parking the thread while another thread holds it.
    pub fn lock(&self) -> UnfairMutexGuard<'_, T> {
        if self
            .state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.lock_contended();
        }

        UnfairMutexGuard { mutex: self }
    }

    #[cold]
    fn lock_contended(&self) {
        let mut spins = 0;

        // Spin briefly before parking.
        while self.state.load(Ordering::Relaxed) == LOCKED && spins < 100 {
            spins += 1;
            std::hint::spin_loop();
        }

        if self
            .state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return;
        }

        while self.state.swap(CONTENDED, Ordering::Acquire) != UNLOCKED {
            wait(&self.state, CONTENDED);
        }
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<UnfairMutexGuard<'_, T>> {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| UnfairMutexGuard { mutex: self })
    }

    /// Returns `true` if some thread currently holds the lock.
    ///
    /// The answer may be stale by the time the caller looks at it.
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != UNLOCKED
    }

    /// Returns a mutable reference to the value; no locking is needed
    /// since the borrow is exclusive.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Releases the lock without a guard.
    ///
    /// # Safety
    ///
    /// The caller must own the lock through a guard it leaked with
    /// [`std::mem::forget`].
    pub(crate) unsafe fn force_unlock(&self) {
        self.unlock();
    }

    fn unlock(&self) {
        if self.state.swap(UNLOCKED, Ordering::Release) == CONTENDED {
            wake_one(&self.state);
        }
    }
}

impl<T: Default> Default for UnfairMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for UnfairMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("UnfairMutex");
        match self.try_lock() {
            Some(guard) => d.field("data", &&*guard),
            None => d.field("data", &format_args!("<locked>")),
        };
        d.finish()
    }
}

/// Scoped access to the value inside an [`UnfairMutex`].
///
/// The lock is released when the guard is dropped.
pub struct UnfairMutexGuard<'a, T: ?Sized> {
    mutex: &'a UnfairMutex<T>,
}

// Safety: sharing the guard only hands out `&T`.
unsafe impl<T: ?Sized + Sync> Sync for UnfairMutexGuard<'_, T> {}

impl<T: ?Sized> Drop for UnfairMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

impl<T: ?Sized> Deref for UnfairMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: holding the guard means holding the lock.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for UnfairMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: holding the guard means holding the lock.
        unsafe { &mut *self.mutex.data.get() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;

    #[test]
    fn try_lock_fails_while_held() {
        let mutex = UnfairMutex::new(1);

        let guard = mutex.lock();
        assert!(mutex.is_locked());
        assert!(mutex.try_lock().is_none());
        drop(guard);

        assert!(!mutex.is_locked());
        assert_eq!(*mutex.try_lock().unwrap(), 1);
    }

    #[test]
    fn contended_increments_are_not_lost() {
        let mutex = Arc::new(UnfairMutex::new(0u64));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mutex = mutex.clone();
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        *mutex.lock() += 1;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*mutex.lock(), 80_000);
    }
}
