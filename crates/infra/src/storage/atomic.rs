//! Atomic JSON file writes.
//!
//! Data is written to a `.tmp` sibling, synced, then renamed over the
//! target so readers never observe a half-written file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use bilimon_domain::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::errors::InfraError;

/// Serialize `value` as pretty JSON and atomically replace `path`.
///
/// # Errors
///
/// Returns `BiliMonError::Serialization` or `BiliMonError::Io`.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value).map_err(InfraError::from)?;

    let temp_path = temp_sibling(path);

    if let Some(parent) = temp_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.map_err(InfraError::from)?;
        }
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .await
        .map_err(InfraError::from)?;
    file.write_all(&data).await.map_err(InfraError::from)?;
    file.sync_all().await.map_err(InfraError::from)?;
    drop(file);

    fs::rename(&temp_path, path).await.map_err(InfraError::from)?;

    debug!(path = %path.display(), bytes = data.len(), "persisted file");
    Ok(())
}

/// `<file name>.tmp` next to `path`, keeping the original extension so
/// `keys.json` and `keys.toml` never share a temp file.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Read and decode a JSON file, returning `Ok(None)` when it does not
/// exist.
///
/// # Errors
///
/// Returns `BiliMonError::Io` for read failures other than not-found and
/// `BiliMonError::Serialization` for malformed content.
pub async fn read_json_if_exists<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(InfraError::from(e).into()),
    };
    let value = serde_json::from_slice(&bytes).map_err(InfraError::from)?;
    Ok(Some(value))
}
