//! Internal utilities.
//!
//! - [`Slab`]: generational storage used for the loop's task table.
//! - [`thread_id`]: compact per-thread identifiers for owner checks.

mod slab;

pub(crate) mod thread_id;

pub(crate) use slab::{Key, Slab};
