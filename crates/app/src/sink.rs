//! Append-only JSON-lines record sink.
//!
//! Each task gets `<output_dir>/<task_id>.jsonl`; every successful fetch
//! appends exactly one `{task_id, fetched_at, payload}` line.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bilimon_core::RecordSink;
use bilimon_domain::{FetchedRecord, Result};
use bilimon_infra::InfraError;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Appends each record as one JSON line to `<dir>/<task id>.jsonl`.
#[derive(Debug)]
pub struct JsonLinesSink {
    dir: PathBuf,
    // serializes appends so lines from concurrent tasks never interleave
    write_lock: Mutex<()>,
}

impl JsonLinesSink {
    /// Sink writing under `dir`; created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), write_lock: Mutex::new(()) }
    }

    /// Directory records are written under.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a task's records go to.
    pub fn path_for(&self, task_id: &str) -> PathBuf {
        let name: String = task_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.jsonl"))
    }
}

#[async_trait]
impl RecordSink for JsonLinesSink {
    async fn write(&self, record: &FetchedRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record).map_err(InfraError::from)?;
        line.push(b'\n');
        let path = self.path_for(&record.task_id);

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await.map_err(InfraError::from)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(InfraError::from)?;
        file.write_all(&line).await.map_err(InfraError::from)?;
        file.flush().await.map_err(InfraError::from)?;

        debug!(task_id = %record.task_id, path = %path.display(), "record appended");
        Ok(())
    }
}
