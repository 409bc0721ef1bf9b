use super::idle_count::{ActiveGuard, IdleCount};

use std::fmt;
use std::ops::Deref;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, Ordering};

#[cfg(debug_assertions)]
use std::sync::atomic::AtomicBool;

/// Read-copy-update cell.
///
/// Readers get a stable snapshot of the current generation without ever
/// blocking. A writer publishes a whole new value with
/// [`update`](Self::update); the previous generation is retired into an
/// [`IdleCount`] domain and dropped once every reader that might hold it
/// has gone idle.
///
/// There must be at most one writer at a time. Debug builds assert this.
///
/// # Examples
///
/// ```
/// use weft::sync::Rcu;
///
/// let config = Rcu::new(vec!["a"]);
///
/// let before = config.read();
/// config.update(vec!["a", "b"]);
///
/// assert_eq!(before.len(), 1);
/// assert_eq!(config.read().len(), 2);
/// ```
pub struct Rcu<T: Send + Sync + 'static> {
    current: AtomicPtr<T>,
    domain: Arc<IdleCount>,
    #[cfg(debug_assertions)]
    writing: AtomicBool,
}

impl<T: Send + Sync + 'static> Rcu<T> {
    /// Creates a cell reclaiming through the global domain.
    pub fn new(value: T) -> Self {
        Self::with_domain(value, IdleCount::global())
    }

    /// Creates a cell reclaiming through `domain`.
    pub fn with_domain(value: T, domain: Arc<IdleCount>) -> Self {
        Self {
            current: AtomicPtr::new(Box::into_raw(Box::new(value))),
            domain,
            #[cfg(debug_assertions)]
            writing: AtomicBool::new(false),
        }
    }

    /// Returns a guard to the current generation.
    ///
    /// The generation stays valid while the guard lives, even if it is
    /// replaced in the meantime.
    pub fn read(&self) -> RcuGuard<'_, T> {
        let active = self.domain.enter();
        let value = self.current.load(Ordering::SeqCst);

        RcuGuard {
            // Safety: the pointer is never null and the generation it
            // names cannot be freed while `active` is held.
            value: unsafe { &*value },
            _active: active,
        }
    }

    /// Publishes `value` as the new generation and retires the old one.
    pub fn update(&self, value: T) {
        #[cfg(debug_assertions)]
        assert!(
            !self.writing.swap(true, Ordering::Acquire),
            "concurrent Rcu::update"
        );

        let old = self
            .current
            .swap(Box::into_raw(Box::new(value)), Ordering::SeqCst);

        // Safety: `old` came from `Box::into_raw` and is now unreachable
        // for new readers.
        let old = unsafe { Box::from_raw(old) };
        self.domain.retire(old);

        #[cfg(debug_assertions)]
        self.writing.store(false, Ordering::Release);

        self.domain.collect();
    }

    /// Frees retired generations no reader can still see.
    pub fn reclaim(&self) -> usize {
        self.domain.collect()
    }

    /// The domain old generations are retired into.
    pub fn domain(&self) -> &Arc<IdleCount> {
        &self.domain
    }
}

impl<T: Send + Sync + 'static> Drop for Rcu<T> {
    fn drop(&mut self) {
        let current = std::mem::replace(self.current.get_mut(), ptr::null_mut());

        // Safety: unique access; older generations are owned by the domain.
        drop(unsafe { Box::from_raw(current) });
    }
}

impl<T: Send + Sync + Default + 'static> Default for Rcu<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Send + Sync + fmt::Debug + 'static> fmt::Debug for Rcu<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Rcu").field(&*self.read()).finish()
    }
}

/// Shared access to one generation of an [`Rcu`].
pub struct RcuGuard<'a, T> {
    value: &'a T,
    _active: ActiveGuard,
}

impl<T> Deref for RcuGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for RcuGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.value, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    struct Canary<'a>(&'a AtomicUsize, u32);

    impl Drop for Canary<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn old_generation_outlives_update_while_read() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        let rcu = Rcu::with_domain(Canary(&DROPS, 1), Arc::new(IdleCount::new()));

        let guard = rcu.read();
        rcu.update(Canary(&DROPS, 2));

        assert_eq!(guard.1, 1);
        assert_eq!(DROPS.load(Ordering::SeqCst), 0);
        assert_eq!(rcu.read().1, 2);

        drop(guard);
        assert_eq!(rcu.reclaim(), 1);
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);

        drop(rcu);
        assert_eq!(DROPS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unread_generations_are_freed_on_update() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        let rcu = Rcu::with_domain(Canary(&DROPS, 0), Arc::new(IdleCount::new()));

        for i in 1..=5 {
            rcu.update(Canary(&DROPS, i));
        }

        assert_eq!(DROPS.load(Ordering::SeqCst), 5);
        assert_eq!(rcu.domain().pending(), 0);
    }
}
