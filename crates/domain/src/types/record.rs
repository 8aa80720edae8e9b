//! Record handed to a sink after a successful fetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One successful fetch, as written by a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedRecord {
    pub task_id: String,
    /// Clock time the payload was received.
    pub fetched_at: DateTime<Utc>,
    /// Full response body.
    pub payload: Value,
}

impl FetchedRecord {
    pub fn new(task_id: impl Into<String>, fetched_at: DateTime<Utc>, payload: Value) -> Self {
        Self { task_id: task_id.into(), fetched_at, payload }
    }
}
