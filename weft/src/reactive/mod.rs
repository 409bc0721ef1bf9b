//! Reactive data binding.
//!
//! - [`Notifier`]: a broadcast point with per-subscriber [`Dispatch`].
//! - [`Subscription`]: RAII guard that unsubscribes on drop.
//! - [`Observer`]: a value cell that notifies on change, edited through a
//!   [`Proxy`].
//! - [`link`]: two-way binding between observers.
//!
//! Notifiers and observers are `Send + Sync`; they can be shared with any
//! thread. Callbacks with [`Dispatch::Main`] run on the main loop.

mod notifier;
mod observer;

pub use notifier::{Dispatch, Notifier, Subscription, WaitFor};
pub use observer::{Link, Observer, Proxy, link};
