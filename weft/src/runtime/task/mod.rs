//! Tasks: cooperative coroutines driven by a [`Loop`](crate::Loop).
//!
//! A task runs on the thread that spawned it, synchronously up to its
//! first suspension point. It suspends only while awaiting:
//! - a timer ([`time::sleep`](crate::time::sleep) and friends),
//! - a notification ([`Notifier::wait`](crate::Notifier::wait)),
//! - the first of several of those ([`first_of`], [`select!`](crate::select),
//!   [`time::timeout`](crate::time::timeout)).
//!
//! There is no hidden yielding in between. Wakers are `Send`, so an event
//! on any thread can wake a task, but the task itself is only ever polled
//! by its loop.

mod core;
mod first_of;
mod handle;
mod state;
mod waker;

pub(crate) use core::{TaskSlot, resume, spawn_on};

pub use core::spawn;
pub use first_of::{FirstOf, first_of};
pub use handle::JoinHandle;
