//! Mock clock for deterministic testing
//!
//! ```ignore
//! use std::time::Duration;
//!
//! use bilimon_common::testing::MockClock;
//! use bilimon_common::Clock;
//!
//! let clock = MockClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.now().duration_since(start), Duration::from_secs(5));
//! ```

// Test utility: poisoned mutexes should fail tests loudly
#![allow(clippy::missing_panics_doc, clippy::expect_used)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::time::Clock;

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed counter, so a clock handed to the code
/// under test can be advanced from the test body.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
    base_system_time: SystemTime,
}

impl MockClock {
    /// Create a new mock clock starting at the current real time.
    pub fn new() -> Self {
        Self::with_system_time(SystemTime::now())
    }

    /// Create a mock clock whose wall time starts at `secs` seconds after
    /// the UNIX epoch.
    pub fn at_unix(secs: u64) -> Self {
        Self::with_system_time(UNIX_EPOCH + Duration::from_secs(secs))
    }

    fn with_system_time(base_system_time: SystemTime) -> Self {
        Self {
            start: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
            base_system_time,
        }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        let mut elapsed = self.elapsed.lock().expect("mutex poisoned");
        *elapsed += duration;
    }

    /// Set the mock clock to a specific elapsed time
    pub fn set_elapsed(&self, duration: Duration) {
        let mut elapsed = self.elapsed.lock().expect("mutex poisoned");
        *elapsed = duration;
    }

    /// Get the current elapsed time
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().expect("mutex poisoned")
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock().expect("mutex poisoned")
    }

    fn system_time(&self) -> SystemTime {
        self.base_system_time + *self.elapsed.lock().expect("mutex poisoned")
    }
}
