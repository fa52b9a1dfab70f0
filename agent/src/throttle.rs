//! Leading-edge throttle for high-frequency input signals.
//!
//! The first signal after a cool-down window is accepted and starts a new
//! window; everything inside the window is dropped. Dropped signals are not
//! queued or coalesced, and they do not extend the window.

use std::time::Duration;

use tokio::time::Instant;

/// Cool-down window for pointer movement (about 20 captures per second).
pub const POINTER_COOLDOWN: Duration = Duration::from_millis(50);

/// Cool-down window for scroll position (about 10 captures per second).
pub const SCROLL_COOLDOWN: Duration = Duration::from_millis(100);

/// Fixed cool-down rate limiter for a single signal source.
#[derive(Debug, Clone)]
pub struct Throttle {
    cooldown: Duration,
    last_accepted: Option<Instant>,
}

impl Throttle {
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_accepted: None,
        }
    }

    /// Decides whether a signal arriving at `now` should be captured.
    ///
    /// Returns `true` and opens a new window when the previous window has
    /// elapsed (or no signal was ever accepted), `false` otherwise.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        let open = match self.last_accepted {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
        };

        if open {
            self.last_accepted = Some(now);
        }

        open
    }
}
