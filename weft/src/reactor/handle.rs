use super::poller::Waker;
use crate::runtime::context;
use crate::sync::ring::Producer;
use crate::utils::{Key, thread_id};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread;

/// Work handed to a loop from any thread.
pub(crate) enum Posted {
    Run(Box<dyn FnOnce() + Send>),
    Resume(Key),
}

/// The part of a loop other threads can reach.
pub(crate) struct Shared {
    pub(crate) producer: Producer<Posted>,
    pub(crate) waker: Arc<Waker>,

    /// Id of the thread that owns the loop.
    pub(crate) owner: u64,

    pub(crate) name: Option<Arc<str>>,

    stop: AtomicBool,
    exit_code: AtomicI32,

    /// Set once the loop is torn down; later posts are dropped.
    closed: AtomicBool,
}

impl Shared {
    pub(crate) fn new(
        producer: Producer<Posted>,
        waker: Arc<Waker>,
        name: Option<Arc<str>>,
    ) -> Self {
        Self {
            producer,
            waker,
            owner: thread_id::current(),
            name,
            stop: AtomicBool::new(false),
            exit_code: AtomicI32::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn request_stop(&self, code: i32) {
        self.exit_code.store(code, Ordering::Relaxed);
        self.stop.store(true, Ordering::Release);
        self.waker.wake();
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Consumes a pending stop request, returning its exit code.
    pub(crate) fn take_stop(&self) -> Option<i32> {
        self.stop
            .swap(false, Ordering::AcqRel)
            .then(|| self.exit_code.load(Ordering::Relaxed))
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// A thread-safe handle to a [`Loop`](crate::Loop).
///
/// Handles are cheap to clone and can be sent anywhere. Closures posted
/// through a handle run on the loop's owning thread, in FIFO order per
/// posting thread; no order is promised between different threads.
#[derive(Clone)]
pub struct LoopHandle {
    pub(crate) shared: Arc<Shared>,
}

impl LoopHandle {
    /// Queues `f` to run on the loop's thread and wakes the loop.
    ///
    /// From a foreign thread the closure goes through the loop's
    /// wait-free ring. If the ring is nearly full the caller waits,
    /// re-waking the loop, until it drains. Posts to a loop that was
    /// torn down are dropped.
    pub fn post<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(Posted::Run(Box::new(f)));
    }

    /// Asks the loop to return from [`Loop::run`](crate::Loop::run) with `code`.
    pub fn stop(&self, code: i32) {
        self.shared.request_stop(code);
    }

    /// Interrupts the loop's current wait without queueing anything.
    pub fn wake(&self) {
        self.shared.waker.wake();
    }

    /// Returns `true` once the loop has been torn down.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Returns `true` if both handles refer to the same loop.
    pub fn same_loop(&self, other: &LoopHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub(crate) fn send(&self, message: Posted) {
        if thread_id::current() == self.shared.owner {
            if let Some(core) = context::current_core() {
                if Arc::ptr_eq(&core.shared, &self.shared) {
                    core.push_local(message.into());
                    return;
                }
            }
        }

        if self.shared.is_closed() {
            tracing::debug!(loop_name = ?self.shared.name, "dropped work posted to a closed loop");
            return;
        }

        let producer = &self.shared.producer;

        if producer.full() {
            tracing::debug!(
                loop_name = ?self.shared.name,
                queued = producer.len(),
                "loop queue full, waiting for it to drain"
            );

            while producer.full() {
                if self.shared.is_closed() {
                    return;
                }

                self.shared.waker.wake();
                thread::yield_now();
            }
        }

        producer.write(message);
        self.shared.waker.wake();
    }
}

impl fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopHandle")
            .field("name", &self.shared.name)
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}
