use crate::reactor::{LoopHandle, Posted};
use crate::utils::Key;

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{RawWaker, RawWakerVTable, Waker};

/// What a task's [`Waker`] points at.
///
/// Waking posts a resume for `key` to the task's loop. The loop drops the
/// resume if the key went stale, so wakes after completion or abort are
/// harmless.
pub(crate) struct TaskWaker {
    handle: LoopHandle,
    key: Key,

    /// Set while a resume is queued, so repeated wakes post only once.
    scheduled: AtomicBool,
}

impl TaskWaker {
    pub(crate) fn new(handle: LoopHandle, key: Key) -> Self {
        Self {
            handle,
            key,
            scheduled: AtomicBool::new(false),
        }
    }

    /// Called by the loop right before polling, so wakes during the poll
    /// schedule another one.
    pub(crate) fn clear(&self) {
        self.scheduled.store(false, Ordering::Release);
    }

    fn wake(&self) {
        if !self.scheduled.swap(true, Ordering::AcqRel) {
            self.handle.send(Posted::Resume(self.key));
        }
    }
}

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_raw, wake_raw, wake_by_ref_raw, drop_raw);

/// Creates a [`Waker`] that resumes the task behind `task` on its loop.
pub(crate) fn make_waker(task: Arc<TaskWaker>) -> Waker {
    // Safety: the pointer comes from `Arc::into_raw` and every vtable
    // function keeps the reference count balanced.
    unsafe { Waker::from_raw(RawWaker::new(Arc::into_raw(task) as *const (), &VTABLE)) }
}

/// Clones the raw waker, incrementing the reference count.
fn clone_raw(ptr: *const ()) -> RawWaker {
    let arc = unsafe { Arc::<TaskWaker>::from_raw(ptr as *const TaskWaker) };
    let cloned = arc.clone();
    mem::forget(arc);

    RawWaker::new(Arc::into_raw(cloned) as *const (), &VTABLE)
}

/// Wakes the task and consumes the waker.
fn wake_raw(ptr: *const ()) {
    let arc = unsafe { Arc::<TaskWaker>::from_raw(ptr as *const TaskWaker) };
    arc.wake();
}

/// Wakes the task without consuming the waker.
fn wake_by_ref_raw(ptr: *const ()) {
    let arc = unsafe { Arc::<TaskWaker>::from_raw(ptr as *const TaskWaker) };
    arc.wake();
    mem::forget(arc);
}

/// Drops the raw waker, decrementing the reference count.
fn drop_raw(ptr: *const ()) {
    unsafe { drop(Arc::<TaskWaker>::from_raw(ptr as *const TaskWaker)) };
}
