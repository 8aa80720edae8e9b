//! Scheduled polling unit.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::target::PollTarget;

/// Unit an interval is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
}

impl IntervalUnit {
    /// Parse a config label. Accepts singular and plural forms,
    /// case-insensitive.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => Some(Self::Seconds),
            "m" | "min" | "minute" | "minutes" => Some(Self::Minutes),
            "h" | "hour" | "hours" => Some(Self::Hours),
            _ => None,
        }
    }

    /// `amount` of this unit, saturating at `u64::MAX` seconds.
    pub const fn duration(self, amount: u64) -> Duration {
        match self {
            Self::Seconds => Duration::from_secs(amount),
            Self::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            Self::Hours => Duration::from_secs(amount.saturating_mul(3600)),
        }
    }
}

/// A periodically executed poll.
///
/// `next_due` is owned by the scheduler's per-task worker, not stored here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    /// Time between the end of one execution and the next.
    pub interval: Duration,
    pub enabled: bool,
    /// Run once immediately at start instead of waiting one interval.
    pub start_now: bool,
    pub target: PollTarget,
}

impl Task {
    /// Enabled task that waits one interval before its first run.
    pub fn new(id: impl Into<String>, interval: Duration, target: PollTarget) -> Self {
        Self { id: id.into(), interval, enabled: true, start_now: false, target }
    }

    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub const fn with_start_now(mut self, start_now: bool) -> Self {
        self.start_now = start_now;
        self
    }
}
