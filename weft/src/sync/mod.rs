//! Thread-safe building blocks under the reactive layer.
//!
//! Everything here is usable without a running loop:
//! - [`UnfairMutex`] and [`RecursiveMutex`]: small blocking locks.
//! - [`IdleCount`] and [`Rcu`]: deferred reclamation for read-mostly data.
//! - [`ring`]: the wait-free MPSC ring the loop uses for cross-thread posts.
//! - [`Subsystem`]: exactly-once start and stop of process-wide services.
//!
//! The notifier and observer types in [`crate::reactive`] use these locks;
//! the loop uses the ring and the global idle count.

mod idle_count;
mod mutex;
mod rcu;
mod recursive_mutex;
mod subsystem;

pub mod ring;

pub use idle_count::{ActiveGuard, IdleCount};
pub use mutex::{UnfairMutex, UnfairMutexGuard};
pub use rcu::{Rcu, RcuGuard};
pub use recursive_mutex::{RecursiveMutex, RecursiveMutexGuard};
pub use subsystem::{Subsystem, SubsystemState};
