use super::timeout_millis;

use std::io;
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, WAIT_FAILED};
use windows_sys::Win32::System::Threading::{
    CreateEventW, INFINITE, SetEvent, WaitForSingleObject,
};

/// Write side of the wake primitive: an auto-reset event.
pub(crate) struct Waker(HANDLE);

unsafe impl Send for Waker {}
unsafe impl Sync for Waker {}

impl Waker {
    /// Interrupts the loop's current or next wait.
    pub(crate) fn wake(&self) {
        unsafe {
            SetEvent(self.0);
        }
    }
}

impl Drop for Waker {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

/// Blocking side of the wake primitive. Owned by the loop.
pub(crate) struct Poller {
    waker: Arc<Waker>,
}

impl Poller {
    pub(crate) fn new() -> io::Result<Self> {
        // Auto-reset, initially non-signalled.
        let event = unsafe { CreateEventW(ptr::null(), 0, 0, ptr::null()) };
        if event.is_null() {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            waker: Arc::new(Waker(event)),
        })
    }

    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    /// Blocks until woken or until `timeout` elapses (`None` waits forever).
    pub(crate) fn wait(&mut self, timeout: Option<Duration>) {
        let timeout_ms = timeout_millis(timeout).unwrap_or(INFINITE);

        let rc = unsafe { WaitForSingleObject(self.waker.0, timeout_ms) };

        if rc == WAIT_FAILED {
            let err = io::Error::last_os_error();
            tracing::warn!(error = %err, "waiting on the wake primitive failed");
        }
    }
}
