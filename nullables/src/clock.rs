//! Nullable clock: deterministic time for testing.

use msgchain_types::{Clock, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A deterministic clock for testing.
///
/// Time only advances when you tell it to. Shareable across threads, so one
/// clock can drive every service of a node under test.
pub struct NullClock {
    current_millis: AtomicU64,
}

impl NullClock {
    pub fn new(initial_millis: u64) -> Self {
        Self {
            current_millis: AtomicU64::new(initial_millis),
        }
    }

    /// Get the current time.
    pub fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.current_millis.load(Ordering::SeqCst))
    }

    /// Advance time by a number of milliseconds.
    pub fn advance_millis(&self, millis: u64) {
        self.current_millis.fetch_add(millis, Ordering::SeqCst);
    }

    /// Advance time by a duration.
    pub fn advance(&self, by: Duration) {
        self.advance_millis(by.as_millis() as u64);
    }

    /// Set the time to a specific value.
    pub fn set(&self, millis: u64) {
        self.current_millis.store(millis, Ordering::SeqCst);
    }
}

impl Default for NullClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for NullClock {
    fn now(&self) -> Timestamp {
        NullClock::now(self)
    }
}
