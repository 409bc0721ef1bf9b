//! Timer awaitables.
//!
//! - [`sleep`] and [`sleep_until`] suspend a task until a deadline,
//! - [`timeout`] races a future against a timer.
//!
//! All of them register with the current thread's [`Loop`](crate::Loop)
//! and are cancelled by dropping them.

mod sleep;
mod timeout;

#[doc(inline)]
pub use sleep::{Sleep, sleep, sleep_until};

#[doc(inline)]
pub use timeout::{Timeout, timeout};
