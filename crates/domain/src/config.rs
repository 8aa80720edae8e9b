//! Configuration structures
//!
//! Every section has defaults so a file only needs to list its tasks.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_API_BASE, DEFAULT_PASSPORT_BASE, DEFAULT_USER_AGENT};
use crate::types::PollTarget;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub login: LoginConfig,
    /// Polling tasks, in start order.
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

/// Where session material lives on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Flat `name=value; ...` cookie file, read first.
    pub cookie_file: PathBuf,
    /// JSON `{cookies: [{name, value}], time}` written after login.
    pub session_file: PathBuf,
    /// JSON `{img_key, sub_key, time}` signing-key cache.
    pub key_cache_file: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            cookie_file: PathBuf::from("cookie.txt"),
            session_file: PathBuf::from("bili_cookies.json"),
            key_cache_file: PathBuf::from("wbi_keys.json"),
        }
    }
}

/// HTTP client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub api_base: String,
    pub passport_base: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            passport_base: DEFAULT_PASSPORT_BASE.to_string(),
            timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Task scheduler tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on a worker's idle sleep between due checks.
    pub tick_millis: u64,
    /// Extra delay after a failed execution.
    pub failure_backoff_secs: u64,
    /// How long `stop` waits for in-flight executions.
    pub shutdown_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_millis: 1000, failure_backoff_secs: 10, shutdown_grace_secs: 5 }
    }
}

/// Record sink settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub output_dir: PathBuf,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self { output_dir: PathBuf::from("data") }
    }
}

/// QR login settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    pub poll_interval_millis: u64,
    /// Give up on an unscanned code after this long.
    pub timeout_secs: u64,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self { poll_interval_millis: 2000, timeout_secs: 180 }
    }
}

/// One `[[tasks]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub id: String,
    /// Amount of `interval_unit` between executions.
    pub interval: u64,
    /// `seconds`, `minutes` or `hours`; anything else falls back to minutes.
    #[serde(default = "default_interval_unit")]
    pub interval_unit: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub start_now: bool,
    /// What to poll.
    pub target: PollTarget,
}

fn default_interval_unit() -> String {
    "minutes".to_string()
}

const fn default_true() -> bool {
    true
}
