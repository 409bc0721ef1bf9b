use super::mutex::UnfairMutex;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;

/// Lifecycle state of a [`Subsystem`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SubsystemState {
    NotStarted = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl SubsystemState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::NotStarted,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

type Deinit<T> = Box<dyn FnOnce(Arc<T>) + Send>;

/// A lazily started, process-wide service with exactly-once init and teardown.
///
/// A `Subsystem` is meant to live in a `static`. The first caller of
/// [`start`](Self::start) runs the initializer while racing callers wait
/// for its verdict:
///
/// ```text
/// NotStarted ──start──▶ Starting ──ok──▶ Running ──stop──▶ Stopping ──▶ Stopped
///      ▲                    │
///      └──────failure───────┘
/// ```
///
/// A failed initializer leaves the subsystem in `NotStarted`, so a later
/// `start` retries. Once stopped, a subsystem cannot be started again.
///
/// The value is handed out as an `Arc<T>`, so callers that still hold it
/// after [`stop`](Self::stop) keep a valid (if retired) instance.
///
/// # Examples
///
/// ```
/// use weft::sync::Subsystem;
///
/// static CONFIG: Subsystem<String> = Subsystem::new();
///
/// let value = CONFIG.start(|| Some("ready".to_owned()), |_| {}).unwrap();
/// assert_eq!(value.as_str(), "ready");
///
/// CONFIG.stop();
/// assert!(CONFIG.get().is_none());
/// ```
pub struct Subsystem<T> {
    state: AtomicU8,
    value: UnfairMutex<Option<Arc<T>>>,
    deinit: UnfairMutex<Option<Deinit<T>>>,
}

impl<T> Subsystem<T> {
    /// Creates a subsystem in the `NotStarted` state.
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(SubsystemState::NotStarted as u8),
            value: UnfairMutex::new(None),
            deinit: UnfairMutex::new(None),
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> SubsystemState {
        SubsystemState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` once the initializer has succeeded and until `stop`.
    pub fn is_running(&self) -> bool {
        self.state() == SubsystemState::Running
    }

    /// Returns the running instance, without starting it.
    pub fn get(&self) -> Option<Arc<T>> {
        if !self.is_running() {
            return None;
        }

        self.value.lock().clone()
    }

    /// Starts the subsystem if needed and returns the running instance.
    ///
    /// Exactly one caller runs `init`. Callers that lose the race wait
    /// until the winner either succeeds, in which case they all get the
    /// same instance, or fails, in which case one of them tries again.
    ///
    /// `deinit` is kept and runs once in [`stop`](Self::stop); the one
    /// passed by a caller that did not run `init` is dropped.
    ///
    /// Returns `None` if `init` failed or the subsystem was already stopped.
    pub fn start<I, D>(&self, init: I, deinit: D) -> Option<Arc<T>>
    where
        I: FnOnce() -> Option<T>,
        D: FnOnce(Arc<T>) + Send + 'static,
    {
        let mut init = Some(init);
        let mut deinit = Some(deinit);

        loop {
            match self.state.compare_exchange(
                SubsystemState::NotStarted as u8,
                SubsystemState::Starting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let (Some(init), Some(deinit)) = (init.take(), deinit.take()) else {
                        unreachable!("a caller wins the start race at most once");
                    };

                    return self.run_init(init, deinit);
                }
                Err(raw) => match SubsystemState::from_u8(raw) {
                    SubsystemState::Running => return self.value.lock().clone(),
                    SubsystemState::Starting => thread::yield_now(),
                    SubsystemState::NotStarted => continue,
                    SubsystemState::Stopping | SubsystemState::Stopped => return None,
                },
            }
        }
    }

    fn run_init<I, D>(&self, init: I, deinit: D) -> Option<Arc<T>>
    where
        I: FnOnce() -> Option<T>,
        D: FnOnce(Arc<T>) + Send + 'static,
    {
        // Puts the state back to NotStarted if `init` unwinds, so waiters
        // do not spin forever.
        struct Revert<'a>(&'a AtomicU8);

        impl Drop for Revert<'_> {
            fn drop(&mut self) {
                self.0
                    .store(SubsystemState::NotStarted as u8, Ordering::Release);
            }
        }

        let revert = Revert(&self.state);

        match init() {
            Some(value) => {
                let value = Arc::new(value);

                *self.value.lock() = Some(value.clone());
                *self.deinit.lock() = Some(Box::new(deinit));

                std::mem::forget(revert);
                self.state
                    .store(SubsystemState::Running as u8, Ordering::Release);

                tracing::debug!(subsystem = std::any::type_name::<T>(), "subsystem running");
                Some(value)
            }
            None => {
                drop(revert);

                tracing::warn!(
                    subsystem = std::any::type_name::<T>(),
                    "subsystem initialization failed"
                );
                None
            }
        }
    }

    /// Tears the subsystem down, running `deinit` exactly once.
    ///
    /// Does nothing if the subsystem is not running (never started, still
    /// starting, or already stopped).
    pub fn stop(&self) {
        if self
            .state
            .compare_exchange(
                SubsystemState::Running as u8,
                SubsystemState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        let value = self.value.lock().take();
        let deinit = self.deinit.lock().take();

        if let (Some(value), Some(deinit)) = (value, deinit) {
            deinit(value);
        }

        self.state
            .store(SubsystemState::Stopped as u8, Ordering::Release);

        tracing::debug!(subsystem = std::any::type_name::<T>(), "subsystem stopped");
    }
}

impl<T> Default for Subsystem<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Subsystem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subsystem")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    #[test]
    fn failed_init_is_retryable() {
        let subsystem: Subsystem<u32> = Subsystem::new();

        assert!(subsystem.start(|| None, |_| {}).is_none());
        assert_eq!(subsystem.state(), SubsystemState::NotStarted);

        let value = subsystem.start(|| Some(7), |_| {}).unwrap();
        assert_eq!(*value, 7);
        assert!(subsystem.is_running());
    }

    #[test]
    fn stop_runs_deinit_once_and_is_terminal() {
        static DEINITS: AtomicUsize = AtomicUsize::new(0);
        let subsystem: Subsystem<u32> = Subsystem::new();

        // Stopping before start is a no-op.
        subsystem.stop();
        assert_eq!(subsystem.state(), SubsystemState::NotStarted);

        subsystem
            .start(
                || Some(1),
                |_| {
                    DEINITS.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();

        subsystem.stop();
        subsystem.stop();

        assert_eq!(DEINITS.load(Ordering::SeqCst), 1);
        assert_eq!(subsystem.state(), SubsystemState::Stopped);
        assert!(subsystem.start(|| Some(2), |_| {}).is_none());
    }

    #[test]
    fn panicking_init_reverts_state() {
        let subsystem: Subsystem<u32> = Subsystem::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            subsystem.start(|| panic!("boom"), |_| {});
        }));

        assert!(result.is_err());
        assert_eq!(subsystem.state(), SubsystemState::NotStarted);
    }
}
