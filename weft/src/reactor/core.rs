use super::handle::{LoopHandle, Posted, Shared};
use super::poller::Poller;
use super::timer::{TimerQueue, deadline_after};
use super::token::TimerToken;
use crate::error::Result;
use crate::runtime::builder::LoopBuilder;
use crate::runtime::task::{self, JoinHandle, TaskSlot};
use crate::runtime::{context, main_loop};
use crate::sync::IdleCount;
use crate::sync::ring::{self, Consumer};
use crate::utils::{Key, Slab};

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Work queued on the owning thread.
pub(crate) enum Job {
    Run(Box<dyn FnOnce()>),
    Resume(Key),
}

impl From<Posted> for Job {
    fn from(posted: Posted) -> Self {
        match posted {
            Posted::Run(f) => Job::Run(f),
            Posted::Resume(key) => Job::Resume(key),
        }
    }
}

/// The loop state. Lives on its owning thread behind an `Rc`.
///
/// No `RefCell` borrow is ever held while user code runs, so callbacks
/// and tasks may freely schedule timers, post, spawn or cancel.
pub(crate) struct Core {
    pub(crate) shared: Arc<Shared>,
    poller: RefCell<Poller>,
    timers: RefCell<TimerQueue>,

    /// Work posted from the owning thread.
    local: RefCell<VecDeque<Job>>,

    /// Work posted from other threads.
    remote: RefCell<Consumer<Posted>>,

    pub(crate) tasks: RefCell<Slab<TaskSlot>>,

    /// Set while a task is being polled.
    pub(crate) polling: Cell<bool>,
}

impl Core {
    pub(crate) fn new(capacity: usize, name: Option<Arc<str>>) -> Result<Self> {
        let poller = Poller::new()?;
        let (producer, consumer) = ring::channel(capacity);

        let shared = Arc::new(Shared::new(producer, poller.waker(), name));

        tracing::debug!(loop_name = ?shared.name, capacity, "loop created");

        Ok(Self {
            shared,
            poller: RefCell::new(poller),
            timers: RefCell::new(TimerQueue::default()),
            local: RefCell::new(VecDeque::new()),
            remote: RefCell::new(consumer),
            tasks: RefCell::new(Slab::new(64)),
            polling: Cell::new(false),
        })
    }

    pub(crate) fn push_local(&self, job: Job) {
        self.local.borrow_mut().push_back(job);
    }

    pub(crate) fn cancel_timer(&self, id: u64) -> bool {
        let (cancelled, callback) = self.timers.borrow_mut().cancel(id);
        drop(callback);
        cancelled
    }

    pub(crate) fn timer_pending(&self, id: u64) -> bool {
        self.timers.borrow().contains(id)
    }

    /// One turn of the loop. `honor_stop` skips the wait while a stop
    /// request is pending.
    pub(crate) fn turn(&self, honor_stop: bool) {
        self.fire_timers();
        self.drain();
        self.reclaim();

        if self.has_work() || (honor_stop && self.shared.stop_requested()) {
            return;
        }

        let timeout = self
            .timers
            .borrow_mut()
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));

        self.poller.borrow_mut().wait(timeout);
    }

    fn fire_timers(&self) {
        let now = Instant::now();
        let watermark = self.timers.borrow().watermark();

        loop {
            let due = self.timers.borrow_mut().pop_due(now, watermark);
            let Some(mut due) = due else {
                break;
            };

            tracing::trace!(timer = due.id, "timer fired");
            (due.callback)();

            self.timers.borrow_mut().finish(due, now);
        }
    }

    /// Runs the posted work present when the drain starts; work posted
    /// meanwhile waits for the next turn.
    fn drain(&self) {
        let remote = self.remote.borrow().len();
        let local = self.local.borrow().len();

        for _ in 0..remote {
            let posted = self.remote.borrow_mut().read();
            self.dispatch(posted.into());
        }

        for _ in 0..local {
            let job = self.local.borrow_mut().pop_front();
            let Some(job) = job else {
                break;
            };
            self.dispatch(job);
        }

        if remote + local > 0 {
            tracing::trace!(remote, local, "drained posted work");
        }
    }

    fn dispatch(&self, job: Job) {
        match job {
            Job::Run(f) => f(),
            Job::Resume(key) => task::resume(self, key),
        }
    }

    fn reclaim(&self) {
        if let Some(domain) = IdleCount::global_if_running() {
            if domain.pending() > 0 {
                domain.collect();
            }
        }
    }

    fn has_work(&self) -> bool {
        !self.local.borrow().is_empty() || !self.remote.borrow().is_empty()
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        self.shared.close();
        main_loop::unregister(&self.shared);

        let tasks = self.tasks.get_mut().drain();
        let timers = self.timers.get_mut().drain();
        let local: Vec<Job> = self.local.get_mut().drain(..).collect();

        let mut remote = Vec::new();
        while let Some(posted) = self.remote.get_mut().try_read() {
            remote.push(posted);
        }

        tracing::debug!(
            loop_name = ?self.shared.name,
            tasks = tasks.len(),
            timers = timers.len(),
            queued = local.len() + remote.len(),
            "loop torn down"
        );
    }
}

/// A single-threaded cooperative event loop.
///
/// Each thread has at most one loop, created lazily by [`Loop::local`] or
/// explicitly through [`LoopBuilder`]. The loop owns:
///
/// - a timer heap, whose callbacks fire on this thread no earlier than
///   their deadline, ties broken in registration order;
/// - a queue of posted closures, fed from this thread and, through a
///   wait-free ring, from any other thread;
/// - the tasks spawned on it.
///
/// `Loop` is a cheap, `!Send` handle; clones refer to the same loop. Use
/// [`Loop::handle`] to reach the loop from other threads.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// let event_loop = weft::Loop::local();
/// let handle = event_loop.handle();
///
/// std::thread::spawn(move || handle.post(|| println!("hello from the loop thread")));
///
/// event_loop.delay(Duration::from_millis(20), {
///     let event_loop = event_loop.clone();
///     move || event_loop.stop(7)
/// }).detach();
///
/// assert_eq!(event_loop.run(), 7);
/// ```
#[derive(Clone)]
pub struct Loop {
    pub(crate) core: Rc<Core>,
}

impl Loop {
    /// Returns this thread's loop, creating it with default settings on
    /// first use.
    ///
    /// # Panics
    ///
    /// Panics if the wake primitive cannot be created, or if called while
    /// the thread is being torn down. Use [`LoopBuilder::build`] to handle
    /// the first case.
    pub fn local() -> Loop {
        if let Some(core) = context::current_core() {
            return Loop { core };
        }

        match LoopBuilder::new().build() {
            Ok(event_loop) => event_loop,
            Err(err) => panic!("failed to create the thread's loop: {err}"),
        }
    }

    /// Returns this thread's loop if one exists.
    pub fn try_local() -> Option<Loop> {
        context::current_core().map(|core| Loop { core })
    }

    /// Returns a `Send + Sync` handle to this loop.
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            shared: self.core.shared.clone(),
        }
    }

    /// The name given through [`LoopBuilder::name`].
    pub fn name(&self) -> Option<&str> {
        self.core.shared.name.as_deref()
    }

    /// Schedules `callback` to run on this thread at or after `deadline`.
    ///
    /// With `repeat`, the timer is re-armed after each run at the previous
    /// deadline plus the interval, skipping periods that were missed.
    pub fn schedule_timer<F>(&self, deadline: Instant, repeat: Option<Duration>, callback: F) -> TimerToken
    where
        F: FnMut() + 'static,
    {
        let id = self
            .core
            .timers
            .borrow_mut()
            .insert(deadline, repeat, Box::new(callback));

        TimerToken {
            id,
            core: Rc::downgrade(&self.core),
        }
    }

    /// Runs `callback` once, `duration` from now.
    pub fn delay<F>(&self, duration: Duration, callback: F) -> TimerToken
    where
        F: FnOnce() + 'static,
    {
        let mut callback = Some(callback);

        self.schedule_timer(deadline_after(Instant::now(), duration), None, move || {
            if let Some(callback) = callback.take() {
                callback();
            }
        })
    }

    /// Runs `callback` every `interval`, starting one interval from now.
    pub fn repeat<F>(&self, interval: Duration, callback: F) -> TimerToken
    where
        F: FnMut() + 'static,
    {
        self.schedule_timer(deadline_after(Instant::now(), interval), Some(interval), callback)
    }

    /// Cancels the timer behind `token`; see [`TimerToken::cancel`].
    pub fn cancel(&self, token: &TimerToken) -> bool {
        debug_assert!(
            token.core.ptr_eq(&Rc::downgrade(&self.core)),
            "timer token belongs to another loop"
        );

        token.cancel()
    }

    /// Number of timers waiting to fire.
    pub fn pending_timers(&self) -> usize {
        self.core.timers.borrow().len()
    }

    /// Queues `f` to run on this loop. Same as [`LoopHandle::post`].
    pub fn post<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle().post(f);
    }

    /// Queues a closure that need not be `Send`; it runs during the next
    /// drain of this loop.
    pub fn post_local<F>(&self, f: F)
    where
        F: FnOnce() + 'static,
    {
        self.core.push_local(Job::Run(Box::new(f)));
    }

    /// Spawns a task on this loop. See [`task::spawn`](crate::task::spawn).
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        task::spawn_on(&self.core, future)
    }

    /// Fires due timers, runs the posted work, then blocks until the next
    /// timer deadline or a wake-up.
    ///
    /// Does not block if work is already queued. A stop request is left
    /// pending for [`run`](Self::run) and does not keep this call from
    /// blocking. A panic in a callback or task unwinds out of this call.
    pub fn run_once(&self) {
        self.core.turn(false);
    }

    /// Runs the loop until [`stop`](Self::stop) is called and returns the
    /// exit code passed to it.
    pub fn run(&self) -> i32 {
        tracing::debug!(loop_name = ?self.core.shared.name, "loop running");

        loop {
            if let Some(code) = self.core.shared.take_stop() {
                tracing::debug!(loop_name = ?self.core.shared.name, code, "loop stopped");
                return code;
            }

            self.core.turn(true);
        }
    }

    /// Makes [`run`](Self::run) return `code` after the current turn.
    pub fn stop(&self, code: i32) {
        self.core.shared.request_stop(code);
    }

    /// Spawns `future` and runs the loop until it completes.
    ///
    /// Stop requests do not interrupt `block_on`; they stay pending for
    /// the next [`run`](Self::run).
    ///
    /// # Panics
    ///
    /// Panics if the task is aborted, or if called from inside a task.
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        assert!(
            !self.core.polling.get(),
            "`block_on` cannot be called from inside a task"
        );

        let handle = self.spawn(future);

        loop {
            if let Some(output) = handle.try_take() {
                return output;
            }

            assert!(!handle.is_aborted(), "the `block_on` task was aborted");

            self.core.turn(false);
        }
    }

    /// Registers this loop as the process main loop, the target of
    /// [`Dispatch::Main`](crate::Dispatch::Main) notifications.
    ///
    /// Registering the same loop twice is a no-op.
    pub fn make_main(&self) -> Result<()> {
        main_loop::register(self.handle())
    }

    /// Returns `true` if this loop is the registered main loop.
    pub fn is_main(&self) -> bool {
        main_loop::main_handle().is_some_and(|main| main.same_loop(&self.handle()))
    }
}

impl fmt::Debug for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loop")
            .field("name", &self.core.shared.name)
            .field("timers", &self.pending_timers())
            .field("tasks", &self.core.tasks.borrow().len())
            .finish()
    }
}
