use super::core::Core;

use std::fmt;
use std::rc::Weak;

/// Owning handle of a scheduled timer.
///
/// Dropping the token cancels the timer. Tokens are bound to the loop's
/// thread (`!Send`) and never keep the loop alive; once the loop is gone
/// they are inert.
#[must_use = "dropping a TimerToken cancels its timer; use `detach` to keep it running"]
pub struct TimerToken {
    pub(crate) id: u64,
    pub(crate) core: Weak<Core>,
}

impl TimerToken {
    /// Cancels the timer.
    ///
    /// Returns `false` if it already fired (one-shot, including from inside
    /// its own callback) or was cancelled.
    /// Cancelling a repeating timer from its own callback stops it from
    /// being re-armed.
    pub fn cancel(&self) -> bool {
        match self.core.upgrade() {
            Some(core) => core.cancel_timer(self.id),
            None => false,
        }
    }

    /// Returns `true` while the timer is waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.core
            .upgrade()
            .is_some_and(|core| core.timer_pending(self.id))
    }

    /// Lets the timer run without a token.
    ///
    /// A detached one-shot fires once; a detached repeating timer runs for
    /// as long as the loop does.
    pub fn detach(mut self) {
        self.core = Weak::new();
    }
}

impl Drop for TimerToken {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerToken").field("id", &self.id).finish()
    }
}
