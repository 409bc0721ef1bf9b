use super::timeout_millis;

use libc::{POLLIN, c_int, close, poll, pollfd, read, write};
use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;

/// Write side of the wake primitive. Shared with every loop handle.
pub(crate) struct Waker {
    read: RawFd,
    write: RawFd,
}

unsafe impl Send for Waker {}
unsafe impl Sync for Waker {}

impl Waker {
    /// Interrupts the loop's current or next wait.
    pub(crate) fn wake(&self) {
        let buf: u64 = 1;

        // EAGAIN means a wake is already pending, which is all we need.
        unsafe {
            write(self.write, &buf as *const u64 as *const _, 8);
        }
    }

    /// Consumes pending wake signals.
    fn drain(&self) {
        let mut buf = [0u8; 64];

        loop {
            let n = unsafe { read(self.read, buf.as_mut_ptr() as *mut _, buf.len()) };
            if n <= 0 {
                break;
            }
        }
    }
}

impl Drop for Waker {
    fn drop(&mut self) {
        sys_close(self.read);

        if self.write != self.read {
            sys_close(self.write);
        }
    }
}

/// Blocking side of the wake primitive. Owned by the loop.
pub(crate) struct Poller {
    waker: Arc<Waker>,
}

impl Poller {
    pub(crate) fn new() -> io::Result<Self> {
        let (read, write) = sys_wake_pair()?;

        Ok(Self {
            waker: Arc::new(Waker { read, write }),
        })
    }

    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    /// Blocks until woken or until `timeout` elapses (`None` waits forever).
    ///
    /// Interrupted and failed waits return early; the loop treats them as
    /// spurious wake-ups.
    pub(crate) fn wait(&mut self, timeout: Option<Duration>) {
        let timeout_ms = timeout_millis(timeout).map_or(-1, |ms| ms.min(c_int::MAX as u32) as c_int);

        let mut fds = pollfd {
            fd: self.waker.read,
            events: POLLIN,
            revents: 0,
        };

        let rc = unsafe { poll(&mut fds, 1, timeout_ms) };

        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                tracing::warn!(error = %err, "waiting on the wake primitive failed");
            }
            return;
        }

        if rc > 0 {
            self.waker.drain();
        }
    }
}

/// Sets a file descriptor to non-blocking mode.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn sys_set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

fn sys_close(fd: RawFd) {
    unsafe { close(fd) };
}

/// Creates the descriptors of the wake primitive as `(read, write)`.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn sys_wake_pair() -> io::Result<(RawFd, RawFd)> {
    let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok((fd, fd))
}

/// Creates the descriptors of the wake primitive as `(read, write)`.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn sys_wake_pair() -> io::Result<(RawFd, RawFd)> {
    let mut fds = [0 as RawFd; 2];

    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(io::Error::last_os_error());
    }

    for fd in fds {
        let cloexec = unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) };
        let result = if cloexec < 0 {
            Err(io::Error::last_os_error())
        } else {
            sys_set_nonblocking(fd)
        };

        if let Err(err) = result {
            sys_close(fds[0]);
            sys_close(fds[1]);
            return Err(err);
        }
    }

    Ok((fds[0], fds[1]))
}
