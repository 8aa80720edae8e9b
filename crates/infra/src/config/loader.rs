//! Configuration loader
//!
//! ## Loading Strategy
//! 1. `BILIMON_CONFIG` names the file explicitly, otherwise standard paths
//!    are probed
//! 2. Format is picked by extension (`.toml` or `.json`)
//! 3. Environment overrides are applied on top
//! 4. The result is validated
//!
//! ## Environment Variables
//! - `BILIMON_CONFIG`: Config file path
//! - `BILIMON_API_BASE`: API base URL
//! - `BILIMON_PASSPORT_BASE`: Passport (login) base URL
//! - `BILIMON_HTTP_TIMEOUT_SECS`: Per-request timeout in seconds
//! - `BILIMON_COOKIE_FILE`: Flat cookie file path
//! - `BILIMON_SESSION_FILE`: Saved session file path
//! - `BILIMON_KEY_CACHE_FILE`: Signing key cache path
//! - `BILIMON_OUTPUT_DIR`: Record output directory
//!
//! ## File Locations
//! The loader probes the following names (in order), first in the current
//! working directory, then next to the executable:
//! `bilimon.toml`, `config.toml`, `bilimon.json`, `config.json`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bilimon_domain::constants::MAX_TASK_INTERVAL_SECS;
use bilimon_domain::{BiliMonError, Config, IntervalUnit, Result, Task, TaskConfig};
use tracing::{debug, info, warn};

const CONFIG_FILE_NAMES: [&str; 4] = ["bilimon.toml", "config.toml", "bilimon.json", "config.json"];

/// Load, override and validate the configuration.
///
/// # Errors
/// Returns `BiliMonError::Config` if no file is found, the file is
/// malformed, an override is invalid, or validation fails.
pub fn load() -> Result<Config> {
    let path = std::env::var_os("BILIMON_CONFIG").map(PathBuf::from);
    let mut config = load_from_file(path)?;
    apply_env_overrides(&mut config)?;
    validate(&config)?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations.
///
/// # Errors
/// Returns `BiliMonError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(BiliMonError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            BiliMonError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| BiliMonError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content, by file extension.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| BiliMonError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| BiliMonError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(BiliMonError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    probe_in(&dirs)
}

fn probe_in(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

/// Apply `BILIMON_*` environment overrides.
///
/// # Errors
/// Returns `BiliMonError::Config` if a numeric override does not parse.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Some(v) = env_var("BILIMON_API_BASE") {
        config.http.api_base = v;
    }
    if let Some(v) = env_var("BILIMON_PASSPORT_BASE") {
        config.http.passport_base = v;
    }
    if let Some(v) = env_var("BILIMON_HTTP_TIMEOUT_SECS") {
        config.http.timeout_secs = v
            .parse()
            .map_err(|e| BiliMonError::Config(format!("Invalid BILIMON_HTTP_TIMEOUT_SECS: {e}")))?;
    }
    if let Some(v) = env_var("BILIMON_COOKIE_FILE") {
        config.credentials.cookie_file = PathBuf::from(v);
    }
    if let Some(v) = env_var("BILIMON_SESSION_FILE") {
        config.credentials.session_file = PathBuf::from(v);
    }
    if let Some(v) = env_var("BILIMON_KEY_CACHE_FILE") {
        config.credentials.key_cache_file = PathBuf::from(v);
    }
    if let Some(v) = env_var("BILIMON_OUTPUT_DIR") {
        config.sink.output_dir = PathBuf::from(v);
    }
    Ok(())
}

/// Check the configuration can drive a scheduler.
///
/// # Errors
/// Returns `BiliMonError::Config` describing the first problem found.
pub fn validate(config: &Config) -> Result<()> {
    if config.http.timeout_secs == 0 {
        return Err(BiliMonError::Config("http.timeout_secs must be greater than zero".into()));
    }

    let mut seen = HashSet::new();
    for task in &config.tasks {
        if task.id.trim().is_empty() {
            return Err(BiliMonError::Config("task id must not be empty".into()));
        }
        if !seen.insert(task.id.as_str()) {
            return Err(BiliMonError::Config(format!("duplicate task id: {}", task.id)));
        }
        if task.interval == 0 {
            return Err(BiliMonError::Config(format!(
                "task {}: interval must be greater than zero",
                task.id
            )));
        }
        let unit = IntervalUnit::from_label(&task.interval_unit).unwrap_or(IntervalUnit::Minutes);
        if unit.duration(task.interval) > Duration::from_secs(MAX_TASK_INTERVAL_SECS) {
            return Err(BiliMonError::Config(format!(
                "task {}: interval exceeds {MAX_TASK_INTERVAL_SECS} seconds",
                task.id
            )));
        }
    }

    if !config.tasks.iter().any(|task| task.enabled) {
        return Err(BiliMonError::Config("no enabled tasks configured".into()));
    }

    Ok(())
}

/// Turn `[[tasks]]` entries into scheduler tasks.
///
/// An unrecognised `interval_unit` falls back to minutes with a warning.
pub fn resolve_tasks(config: &Config) -> Vec<Task> {
    config.tasks.iter().map(resolve_task).collect()
}

fn resolve_task(entry: &TaskConfig) -> Task {
    let unit = IntervalUnit::from_label(&entry.interval_unit).unwrap_or_else(|| {
        warn!(
            task_id = %entry.id,
            interval_unit = %entry.interval_unit,
            "unknown interval unit, using minutes"
        );
        IntervalUnit::Minutes
    });

    debug!(task_id = %entry.id, interval = entry.interval, ?unit, "resolved task");
    Task::new(entry.id.clone(), unit.duration(entry.interval), entry.target.clone())
        .with_enabled(entry.enabled)
        .with_start_now(entry.start_now)
}

/// Non-empty environment variable.
fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
