use crate::error::{Error, Result};
use crate::reactor::{Core, Loop};
use crate::runtime::context;
use crate::sync::ring::SLACK;

use std::rc::Rc;
use std::sync::Arc;

/// Default number of slots in the cross-thread queue.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Builder for configuring and installing the current thread's loop.
///
/// # Examples
///
/// ```
/// use weft::LoopBuilder;
///
/// let event_loop = LoopBuilder::new()
///     .name("ui")
///     .capacity(256)
///     .build()
///     .unwrap();
///
/// assert_eq!(event_loop.name(), Some("ui"));
/// assert!(LoopBuilder::new().build().is_err());
/// ```
#[derive(Clone, Debug)]
pub struct LoopBuilder {
    /// Slots in the ring other threads post through.
    capacity: usize,

    /// Name attached to the loop's log events.
    name: Option<Arc<str>>,
}

impl LoopBuilder {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            name: None,
        }
    }

    /// Sets the capacity of the cross-thread queue.
    ///
    /// Producers wait once it holds `capacity - 16` closures.
    ///
    /// # Panics
    ///
    /// Panics if `capacity <= 32`.
    pub fn capacity(mut self, capacity: usize) -> Self {
        assert!(
            capacity > SLACK * 2,
            "capacity must be larger than {}",
            SLACK * 2
        );

        self.capacity = capacity;
        self
    }

    /// Names the loop in log events.
    pub fn name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Creates the loop and installs it on the calling thread.
    ///
    /// Fails with [`Error::LoopExists`] if the thread already has a loop,
    /// and with [`Error::Wake`] if the wake primitive cannot be created.
    pub fn build(self) -> Result<Loop> {
        if context::current_core().is_some() {
            return Err(Error::LoopExists);
        }

        let core = Rc::new(Core::new(self.capacity, self.name)?);

        if !context::install(core.clone()) {
            return Err(Error::LoopExists);
        }

        Ok(Loop { core })
    }
}

impl Default for LoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
