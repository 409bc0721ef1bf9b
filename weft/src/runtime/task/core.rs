use super::JoinHandle;
use super::state::JoinCell;
use super::waker::{TaskWaker, make_waker};
use crate::reactor::{Core, Loop, LoopHandle};
use crate::utils::Key;

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

type LocalFuture = Pin<Box<dyn Future<Output = ()>>>;

/// A task as stored in its loop's slab.
pub(crate) struct TaskSlot {
    /// The task's future, or `None` while the loop is polling it.
    future: Option<LocalFuture>,
    waker: Arc<TaskWaker>,
}

/// Spawns a future as a task on the current thread's loop.
///
/// The task runs synchronously, right now, up to its first suspension
/// point; after that it is resumed by the loop whenever what it awaits
/// fires. The future does not need to be `Send`: it never leaves this
/// thread.
///
/// # Panics
///
/// Panics under the same conditions as [`Loop::local`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use weft::{Loop, task, time};
///
/// let handle = task::spawn(async {
///     time::sleep(Duration::from_millis(5)).await;
///     "done"
/// });
/// assert!(!handle.is_finished());
///
/// let event_loop = Loop::local();
/// while !handle.is_finished() {
///     event_loop.run_once();
/// }
/// assert_eq!(handle.try_take(), Some("done"));
/// ```
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    Loop::local().spawn(future)
}

pub(crate) fn spawn_on<F>(core: &Rc<Core>, future: F) -> JoinHandle<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    let cell = Rc::new(JoinCell::new());
    let output = cell.clone();

    let wrapped: LocalFuture = Box::pin(async move {
        let value = future.await;
        output.finish(value);
    });

    let handle = LoopHandle {
        shared: core.shared.clone(),
    };

    let key = core.tasks.borrow_mut().insert_with(|key| TaskSlot {
        future: Some(wrapped),
        waker: Arc::new(TaskWaker::new(handle, key)),
    });

    tracing::trace!(task = key.index, "task spawned");
    resume(core, key);

    JoinHandle {
        key,
        cell,
        core: Rc::downgrade(core),
    }
}

/// Polls the task behind `key` once.
///
/// A stale key (finished or aborted task) is ignored, as is a resume for
/// a task that is already being polled further up the stack.
pub(crate) fn resume(core: &Core, key: Key) {
    let taken = {
        let mut tasks = core.tasks.borrow_mut();
        tasks
            .get_mut(key)
            .and_then(|slot| Some((slot.future.take()?, slot.waker.clone())))
    };

    let Some((mut future, task_waker)) = taken else {
        tracing::trace!(task = key.index, "stale resume ignored");
        return;
    };

    task_waker.clear();
    let waker = make_waker(task_waker);
    let mut cx = Context::from_waker(&waker);

    // Drops the task's slot if the poll unwinds.
    struct Unwind<'a> {
        core: &'a Core,
        key: Key,
        was_polling: bool,
    }

    impl Drop for Unwind<'_> {
        fn drop(&mut self) {
            self.core.polling.set(self.was_polling);

            if std::thread::panicking() {
                let slot = self.core.tasks.borrow_mut().remove(self.key);
                drop(slot);
            }
        }
    }

    let guard = Unwind {
        core,
        key,
        was_polling: core.polling.replace(true),
    };

    tracing::trace!(task = key.index, "task resumed");
    let poll = future.as_mut().poll(&mut cx);
    drop(guard);

    match poll {
        Poll::Ready(()) => {
            let slot = core.tasks.borrow_mut().remove(key);
            drop(slot);
        }
        Poll::Pending => {
            let mut tasks = core.tasks.borrow_mut();

            match tasks.get_mut(key) {
                Some(slot) => slot.future = Some(future),
                None => {
                    // Aborted while running.
                    drop(tasks);
                    drop(future);
                }
            }
        }
    }
}
