//! Glue between the loop and the code it runs.
//!
//! - `builder`: configuration and installation of a thread's loop,
//! - `context`: the thread-local current loop,
//! - `main_loop`: the process-wide main loop registration,
//! - [`task`]: spawning and resuming tasks.

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod main_loop;

pub mod task;
