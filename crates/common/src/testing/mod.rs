//! Testing utilities and helpers
//!
//! - **[`time`]**: a controllable [`MockClock`] for wall-clock dependent
//!   logic (signature timestamps, cache ages)
//!
//! ## Usage
//!
//! ```ignore
//! use std::time::Duration;
//!
//! use bilimon_common::testing::MockClock;
//! use bilimon_common::Clock;
//!
//! let clock = MockClock::at_unix(1_700_000_000);
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.unix_seconds(), 1_700_000_005);
//! ```

pub mod time;

pub use time::MockClock;
