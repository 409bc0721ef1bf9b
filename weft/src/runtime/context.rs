use crate::reactor::Core;

use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    /// The loop owned by the current thread.
    ///
    /// Installed once by the loop builder and dropped with the thread,
    /// which tears the loop down.
    static CURRENT_LOOP: RefCell<Option<Rc<Core>>> = const { RefCell::new(None) };
}

/// Returns the current thread's loop, if one is installed.
///
/// Returns `None` while the thread's locals are being destroyed.
pub(crate) fn current_core() -> Option<Rc<Core>> {
    CURRENT_LOOP
        .try_with(|cell| cell.try_borrow().ok().and_then(|core| core.clone()))
        .ok()
        .flatten()
}

/// Installs `core` as the current thread's loop.
///
/// Returns `false` if the thread already has a loop or is exiting.
pub(crate) fn install(core: Rc<Core>) -> bool {
    CURRENT_LOOP
        .try_with(|cell| {
            let mut current = cell.borrow_mut();
            if current.is_some() {
                return false;
            }

            *current = Some(core);
            true
        })
        .unwrap_or(false)
}
