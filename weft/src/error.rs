use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the runtime.
///
/// Contract violations (cancelling a timer from another thread, two
/// concurrent RCU writers, ...) are debug assertions, not errors. Panics
/// raised by callbacks and tasks unwind through the loop unchanged.
#[derive(Debug, Error)]
pub enum Error {
    #[error("a loop is already installed on this thread")]
    LoopExists,

    #[error("another loop is already registered as the main loop")]
    MainExists,

    #[error("wake primitive error: {0}")]
    Wake(#[from] std::io::Error),

    #[error("deadline elapsed")]
    Elapsed,

    #[error("subsystem has been stopped")]
    Stopped,
}

impl Error {
    /// Returns `true` for [`Error::Elapsed`].
    #[must_use]
    pub fn is_elapsed(&self) -> bool {
        matches!(self, Self::Elapsed)
    }
}
