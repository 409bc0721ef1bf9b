use crate::error::{Error, Result};
use crate::reactor::{LoopHandle, Shared};
use crate::sync::{Subsystem, UnfairMutex};

use std::sync::Arc;

type Registry = UnfairMutex<Option<LoopHandle>>;

/// Process-wide record of the main loop.
static MAIN: Subsystem<Registry> = Subsystem::new();

fn registry() -> Result<Arc<Registry>> {
    MAIN.start(
        || Some(UnfairMutex::new(None)),
        |registry| {
            registry.lock().take();
        },
    )
    .ok_or(Error::Stopped)
}

pub(crate) fn register(handle: LoopHandle) -> Result<()> {
    let registry = registry()?;
    let mut main = registry.lock();

    match main.as_ref() {
        Some(current) if current.same_loop(&handle) => Ok(()),
        Some(current) if !current.is_closed() => Err(Error::MainExists),
        _ => {
            tracing::debug!(loop_name = ?handle.shared.name, "main loop registered");
            *main = Some(handle);
            Ok(())
        }
    }
}

/// Forgets the main loop if it is the loop behind `shared`.
pub(crate) fn unregister(shared: &Arc<Shared>) {
    let Some(registry) = MAIN.get() else {
        return;
    };

    let mut main = registry.lock();
    if main
        .as_ref()
        .is_some_and(|current| Arc::ptr_eq(&current.shared, shared))
    {
        *main = None;
    }
}

pub(crate) fn shutdown() {
    MAIN.stop();
}

/// Returns a handle to the registered main loop, if any.
///
/// See [`Loop::make_main`](crate::Loop::make_main).
pub fn main_handle() -> Option<LoopHandle> {
    MAIN.get()?
        .lock()
        .as_ref()
        .filter(|handle| !handle.is_closed())
        .cloned()
}
