//! The loop ("reactor").
//!
//! One loop per owning thread. It keeps a timer heap and drains the work
//! posted to it, running every callback and resuming every task on the
//! owning thread. Between turns it blocks on the host wake primitive in
//! [`poller`] until the next deadline or a wake signal.

mod core;
mod handle;
mod poller;
mod timer;
mod token;

pub(crate) use core::Core;
pub(crate) use handle::{Posted, Shared};
pub(crate) use timer::deadline_after;

pub use core::Loop;
pub use handle::LoopHandle;
pub use token::TimerToken;
