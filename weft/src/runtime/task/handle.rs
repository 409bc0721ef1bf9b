use super::state::JoinCell;
use crate::reactor::Core;
use crate::utils::Key;

use std::fmt;
use std::rc::{Rc, Weak};

/// A handle to a spawned task.
///
/// The handle is not a future: a task only suspends on timers, notifier
/// waits and first-of combinators. Poll it with
/// [`try_take`](Self::try_take), or run the task to completion with
/// [`Loop::block_on`](crate::Loop::block_on).
///
/// Dropping the `JoinHandle` does **not** cancel the task; it only
/// discards the ability to observe its result.
pub struct JoinHandle<T> {
    pub(crate) key: Key,
    pub(crate) cell: Rc<JoinCell<T>>,
    pub(crate) core: Weak<Core>,
}

impl<T> JoinHandle<T> {
    /// Returns `true` once the task has produced its output.
    pub fn is_finished(&self) -> bool {
        self.cell.is_finished()
    }

    /// Returns `true` if the task was aborted before completing.
    pub fn is_aborted(&self) -> bool {
        self.cell.is_aborted()
    }

    /// Takes the task's output if it has finished and was not taken yet.
    pub fn try_take(&self) -> Option<T> {
        self.cell.take()
    }

    /// Destroys the task's future.
    ///
    /// Everything the task was awaiting is deregistered as the future
    /// drops, so the task is never resumed again. No-op if the task
    /// already finished.
    pub fn abort(&self) {
        if self.cell.is_finished() {
            return;
        }

        self.cell.abort();

        if let Some(core) = self.core.upgrade() {
            let slot = core.tasks.borrow_mut().remove(self.key);
            drop(slot);
        }
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("finished", &self.is_finished())
            .field("aborted", &self.is_aborted())
            .finish()
    }
}
