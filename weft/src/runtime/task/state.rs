use std::cell::RefCell;

/// Lifecycle of a task as seen by its [`JoinHandle`](super::JoinHandle).
pub(crate) enum State<T> {
    /// The future has not completed yet.
    Running,

    /// The future completed; the output waits to be taken.
    Finished(T),

    /// The output was handed out.
    Taken,

    /// The task was aborted before completing.
    Aborted,
}

/// State shared between a task's wrapper future and its join handle.
///
/// Both live on the loop's thread, so a `RefCell` is enough.
pub(crate) struct JoinCell<T> {
    state: RefCell<State<T>>,
}

impl<T> JoinCell<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: RefCell::new(State::Running),
        }
    }

    pub(crate) fn finish(&self, value: T) {
        let mut state = self.state.borrow_mut();
        if matches!(*state, State::Running) {
            *state = State::Finished(value);
        }
    }

    pub(crate) fn abort(&self) {
        let mut state = self.state.borrow_mut();
        if matches!(*state, State::Running) {
            *state = State::Aborted;
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        matches!(*self.state.borrow(), State::Finished(_) | State::Taken)
    }

    pub(crate) fn is_aborted(&self) -> bool {
        matches!(*self.state.borrow(), State::Aborted)
    }

    pub(crate) fn take(&self) -> Option<T> {
        let mut state = self.state.borrow_mut();

        match std::mem::replace(&mut *state, State::Taken) {
            State::Finished(value) => Some(value),
            other => {
                *state = other;
                None
            }
        }
    }
}
