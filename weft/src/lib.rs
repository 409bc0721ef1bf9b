//! # Weft
//!
//! **Weft** is the reactive dispatch runtime underneath an interactive GUI
//! toolkit. It gives each UI thread a single-threaded cooperative event
//! loop and lets the rest of the process talk to it without locks on the
//! hot path.
//!
//! It provides:
//!
//! - A per-thread [`Loop`] with a timer heap and a wait-free cross-thread
//!   queue, blocked on an OS wake primitive between turns
//! - **Tasks** ([`task::spawn`]) that suspend on timers, notifications, or
//!   the first of several futures
//! - A multi-subscriber [`Notifier`] and an [`Observer`] value cell for
//!   data binding, with optional delivery on the main loop
//! - Thread-safe building blocks in [`sync`]: an unfair mutex, a
//!   recursive mutex, an RCU cell, an MPSC ring and a subsystem lifecycle
//! - **Macros**: `#[weft::main]`, `#[weft::test]`, `join!` and `select!`
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use weft::{Dispatch, Loop, Observer, task, time};
//!
//! let event_loop = Loop::local();
//! event_loop.make_main().unwrap();
//!
//! let title = Observer::new(String::new());
//! let _sub = title.subscribe(Dispatch::Main, |t| println!("title: {t}"));
//!
//! let writer = title.clone();
//! std::thread::spawn(move || writer.set("loaded".into()));
//!
//! let handle = event_loop.handle();
//! task::spawn(async move {
//!     time::sleep(Duration::from_millis(20)).await;
//!     handle.stop(0);
//! });
//!
//! assert_eq!(event_loop.run(), 0);
//! ```
//!
//! ## Modules
//!
//! - [`task`]: spawning tasks and racing futures
//! - [`time`]: sleep and timeout
//! - [`reactive`]: notifiers, observers and links
//! - [`sync`]: locks, RCU and the MPSC ring

mod error;
mod reactor;
mod runtime;
mod utils;

pub mod reactive;
pub mod sync;
pub mod time;

pub use error::{Error, Result};
pub use reactive::{Dispatch, Link, Notifier, Observer, Subscription, link};
pub use reactor::{Loop, LoopHandle, TimerToken};
pub use runtime::builder::{DEFAULT_CAPACITY, LoopBuilder};
pub use runtime::main_loop::main_handle;
pub use runtime::task;

pub use weft_macros::*;

/// Tears down the process-wide services.
///
/// Forgets the main loop, then stops the global [`IdleCount`](sync::IdleCount)
/// after reclaiming what it can. Loops keep running; later
/// [`Loop::make_main`] calls fail with [`Error::Stopped`].
pub fn shutdown() {
    runtime::main_loop::shutdown();
    sync::IdleCount::stop_global();
}
