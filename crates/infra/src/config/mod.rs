//! Configuration loading and management
//!
//! This module loads the application configuration from a TOML or JSON
//! file, applies environment overrides and turns task entries into
//! scheduler [`bilimon_domain::Task`]s.

pub mod loader;

// Re-export commonly used items
pub use loader::{
    apply_env_overrides, load, load_from_file, probe_config_paths, resolve_tasks, validate,
};
