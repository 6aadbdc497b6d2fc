//! Persistent job registry.
//!
//! Each call is a single transaction against the backing store. Job
//! definitions are namespaced by the manager identifier so several job
//! managers can share one registry.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CronError, CronResult};
use crate::job::{JobDefinition, JobKey};

/// Job store trait for persistence.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Load every job accepted by the given manager.
    async fn fetch_all(&self, manager_id: &str) -> CronResult<Vec<JobDefinition>>;

    /// Load a job by key.
    async fn fetch(&self, manager_id: &str, key: &JobKey) -> CronResult<Option<JobDefinition>>;

    /// Save a job, replacing any previous definition with the same key.
    async fn save(&self, manager_id: &str, job: &JobDefinition) -> CronResult<()>;

    /// Delete a job. Deleting an unknown job is not an error.
    async fn remove(&self, manager_id: &str, key: &JobKey) -> CronResult<()>;
}

/// In-memory job store.
pub struct MemoryJobStore {
    jobs: tokio::sync::RwLock<HashMap<String, BTreeMap<JobKey, JobDefinition>>>,
}

impl MemoryJobStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self {
            jobs: tokio::sync::RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn fetch_all(&self, manager_id: &str) -> CronResult<Vec<JobDefinition>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .get(manager_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch(&self, manager_id: &str, key: &JobKey) -> CronResult<Option<JobDefinition>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(manager_id).and_then(|m| m.get(key)).cloned())
    }

    async fn save(&self, manager_id: &str, job: &JobDefinition) -> CronResult<()> {
        let mut jobs = self.jobs.write().await;
        jobs.entry(manager_id.to_string())
            .or_default()
            .insert(job.key(), job.clone());
        Ok(())
    }

    async fn remove(&self, manager_id: &str, key: &JobKey) -> CronResult<()> {
        let mut jobs = self.jobs.write().await;
        if let Some(m) = jobs.get_mut(manager_id) {
            m.remove(key);
        }
        Ok(())
    }
}

/// File system based job store.
///
/// Layout: `<root>/<manager_id>/<role>.<name>.json`, each part escaped so
/// that distinct keys never share a file. Every write goes to its own
/// temporary file that is renamed over the target, so a reader never sees a
/// half-written definition.
pub struct FileJobStore {
    storage_path: PathBuf,
}

impl FileJobStore {
    /// Create a new file-based job store rooted at `storage_path`.
    pub async fn new(storage_path: impl Into<PathBuf>) -> CronResult<Self> {
        let storage_path = storage_path.into();

        fs::create_dir_all(&storage_path).await.map_err(|e| {
            CronError::Store(format!("Failed to create job store directory: {}", e))
        })?;

        debug!("FileJobStore initialized at {:?}", storage_path);

        Ok(Self { storage_path })
    }

    /// Root directory of the store.
    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    fn manager_dir(&self, manager_id: &str) -> PathBuf {
        self.storage_path.join(Self::sanitize(manager_id))
    }

    fn job_path(&self, manager_id: &str, key: &JobKey) -> PathBuf {
        self.manager_dir(manager_id).join(format!(
            "{}.{}.json",
            Self::sanitize(&key.role),
            Self::sanitize(&key.name)
        ))
    }

    /// Percent-escape everything but ASCII alphanumerics and `-`.
    fn sanitize(part: &str) -> String {
        let mut out = String::with_capacity(part.len());
        for byte in part.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                out.push(byte as char);
            } else {
                out.push_str(&format!("%{:02X}", byte));
            }
        }
        out
    }

    async fn read_job(path: &Path) -> CronResult<JobDefinition> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| CronError::Store(format!("Failed to read job file: {}", e)))?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn fetch_all(&self, manager_id: &str) -> CronResult<Vec<JobDefinition>> {
        let dir = self.manager_dir(manager_id);

        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut jobs = Vec::new();
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| CronError::Store(format!("Failed to read job directory: {}", e)))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CronError::Store(format!("Failed to read directory entry: {}", e)))?
        {
            let path = entry.path();

            if path.extension().is_some_and(|ext| ext == "json") {
                match Self::read_job(&path).await {
                    Ok(job) => jobs.push(job),
                    Err(e) => warn!("Skipping unreadable job file {:?}: {}", path, e),
                }
            }
        }

        jobs.sort_by_key(JobDefinition::key);
        debug!("Loaded {} jobs from {:?}", jobs.len(), dir);
        Ok(jobs)
    }

    async fn fetch(&self, manager_id: &str, key: &JobKey) -> CronResult<Option<JobDefinition>> {
        let path = self.job_path(manager_id, key);

        if !path.exists() {
            return Ok(None);
        }

        Ok(Some(Self::read_job(&path).await?))
    }

    async fn save(&self, manager_id: &str, job: &JobDefinition) -> CronResult<()> {
        let dir = self.manager_dir(manager_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CronError::Store(format!("Failed to create job directory: {}", e)))?;

        let key = job.key();
        let path = self.job_path(manager_id, &key);
        let tmp_path = path.with_extension(format!("json.{}.tmp", Uuid::new_v4()));

        let content = serde_json::to_string_pretty(job)?;
        fs::write(&tmp_path, content)
            .await
            .map_err(|e| CronError::Store(format!("Failed to write job file: {}", e)))?;
        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(CronError::Store(format!("Failed to commit job file: {}", e)));
        }

        debug!("Saved job '{}' to {:?}", key, path);
        Ok(())
    }

    async fn remove(&self, manager_id: &str, key: &JobKey) -> CronResult<()> {
        let path = self.job_path(manager_id, key);

        if path.exists() {
            fs::remove_file(&path)
                .await
                .map_err(|e| CronError::Store(format!("Failed to delete job file: {}", e)))?;
            debug!("Deleted job '{}' from {:?}", key, path);
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
