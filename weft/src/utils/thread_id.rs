use std::sync::atomic::{AtomicU64, Ordering};

/// Next identifier to hand out. Zero is reserved for "no thread".
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_ID: u64 = NEXT_ID.fetch_add(1, Ordering::Relaxed);
}

/// Sentinel meaning "owned by no thread".
pub(crate) const NO_THREAD: u64 = 0;

/// Returns a small, process-unique, non-zero id for the calling thread.
///
/// Unlike [`std::thread::ThreadId`] this fits in an atomic, which the
/// recursive mutex and the loop handle need for owner checks.
pub(crate) fn current() -> u64 {
    CURRENT_ID.with(|id| *id)
}
