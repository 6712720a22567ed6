//! Job state persistence.
//!
//! Provides a trait-based store with two backends:
//! - `FilesystemJobStore`: one pretty-printed JSON file per job
//! - `MemoryJobStore`: in-process map, for tests and embedding

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::SynthesisJob;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt job state in {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize job state: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `data` to `path` so readers see either the old or the new content.
///
/// The bytes go to a temp file in the same directory, are synced, then
/// renamed over the target.
pub async fn write_atomic(path: &Path, data: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io_error(parent))?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(io_error(&temp_path))?;
    file.write_all(data).await.map_err(io_error(&temp_path))?;
    file.sync_all().await.map_err(io_error(&temp_path))?;
    drop(file);

    fs::rename(&temp_path, path).await.map_err(io_error(path))?;

    Ok(())
}

/// Persistence for [`SynthesisJob`]s.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Load a job, or `None` if it has never been saved.
    async fn load(&self, job_id: &str) -> StoreResult<Option<SynthesisJob>>;

    /// Persist a job, replacing any previous state.
    async fn save(&self, job: &SynthesisJob) -> StoreResult<()>;

    /// Remove a job's state. Removing an unknown job is not an error.
    async fn delete(&self, job_id: &str) -> StoreResult<()>;

    /// Backend name for diagnostics
    fn backend_type(&self) -> &str;
}

/// Filesystem store: `{state_dir}/synthesis_state_{job_id}.json`.
#[derive(Debug, Clone)]
pub struct FilesystemJobStore {
    state_dir: PathBuf,
}

impl FilesystemJobStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn state_path(&self, job_id: &str) -> PathBuf {
        self.state_dir
            .join(format!("synthesis_state_{job_id}.json"))
    }
}

#[async_trait]
impl JobStore for FilesystemJobStore {
    async fn load(&self, job_id: &str) -> StoreResult<Option<SynthesisJob>> {
        let path = self.state_path(job_id);

        let contents = match fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let job = serde_json::from_slice(&contents).map_err(|source| {
            warn!(path = %path.display(), error = %source, "Job state file is corrupt");
            StoreError::Corrupt {
                path: path.clone(),
                source,
            }
        })?;

        debug!(job_id = job_id, path = %path.display(), "Loaded job state");
        Ok(Some(job))
    }

    async fn save(&self, job: &SynthesisJob) -> StoreResult<()> {
        let path = self.state_path(&job.job_id);
        let json = serde_json::to_vec_pretty(job)?;
        write_atomic(&path, &json).await
    }

    async fn delete(&self, job_id: &str) -> StoreResult<()> {
        let path = self.state_path(job_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn backend_type(&self) -> &str {
        "filesystem"
    }
}

/// In-memory store. Jobs are cloned in and out, so callers never share state.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, SynthesisJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn load(&self, job_id: &str) -> StoreResult<Option<SynthesisJob>> {
        Ok(self.jobs.read().get(job_id).cloned())
    }

    async fn save(&self, job: &SynthesisJob) -> StoreResult<()> {
        self.jobs.write().insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn delete(&self, job_id: &str) -> StoreResult<()> {
        self.jobs.write().remove(job_id);
        Ok(())
    }

    fn backend_type(&self) -> &str {
        "memory"
    }
}
