//! Host wake primitive.
//!
//! The loop blocks here until its next timer deadline or until another
//! thread signals the [`Waker`]. A signal sent before the loop starts
//! waiting is remembered, so a wake is never lost:
//!
//! - Linux: an `eventfd` counter,
//! - other unix: a non-blocking self-pipe,
//! - Windows: an auto-reset event object.
//!
//! Both sides block with `poll(2)` or `WaitForSingleObject`.

#[cfg(unix)]
mod unix;

#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub(crate) use unix::{Poller, Waker};

#[cfg(windows)]
pub(crate) use windows::{Poller, Waker};

use std::time::Duration;

/// Converts a wait timeout to whole milliseconds, rounding up so the loop
/// never wakes before a deadline only to find nothing due.
pub(crate) fn timeout_millis(timeout: Option<Duration>) -> Option<u32> {
    timeout.map(|timeout| {
        let millis = timeout.as_nanos().div_ceil(1_000_000);
        millis.min(u32::MAX as u128 - 1) as u32
    })
}
