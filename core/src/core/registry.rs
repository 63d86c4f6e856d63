//! In-memory job table for scans launched by this process.
//!
//! Each accepted request gets a fresh UUID and its own directory under the
//! scan root. Records are never removed; a job leaves `running` exactly once,
//! through `mark_completed` or `mark_failed`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::ScanProfile;
use crate::error::{ServiceError, ServiceResult};
use crate::utils::validator::{OptionValue, ScanRequest};

/// Captured stdout of a successful run.
pub const RESULTS_FILE: &str = "scan_results.txt";
/// Captured stderr of a failed run.
pub const ERROR_FILE: &str = "error.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub target: String,
    pub profile: ScanProfile,
    pub options: Vec<(String, OptionValue)>,
    pub status: JobStatus,
    pub command: Vec<String>,
    pub output_dir: PathBuf,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Job {
    pub fn results_path(&self) -> PathBuf {
        self.output_dir.join(RESULTS_FILE)
    }
}

pub struct JobRegistry {
    scan_root: PathBuf,
    max_running: usize,
    jobs: RwLock<HashMap<String, Job>>,
}

impl JobRegistry {
    /// `max_running` of 0 means no ceiling.
    pub fn new(scan_root: impl Into<PathBuf>, max_running: usize) -> Self {
        Self {
            scan_root: scan_root.into(),
            max_running,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn scan_root(&self) -> &Path {
        &self.scan_root
    }

    /// Registers a new `running` job for a validated request.
    ///
    /// The output directory exists before `build_args` is called with it, so
    /// the argument vector can point the scanner at it. No lock is held while
    /// the directory is created; the ceiling is checked again before insert.
    pub async fn create<F>(&self, request: ScanRequest, build_args: F) -> ServiceResult<Job>
    where
        F: FnOnce(&ScanRequest, &Path) -> Vec<String>,
    {
        let id = {
            let jobs = self.jobs.read().await;
            self.check_capacity(&jobs, &request.target)?;
            loop {
                let candidate = Uuid::new_v4().to_string();
                if !jobs.contains_key(&candidate) {
                    break candidate;
                }
            }
        };

        let output_dir = self.scan_root.join(&id);
        fs::create_dir_all(&self.scan_root).await?;
        // create_dir (not _all) so a leftover directory is never shared.
        fs::create_dir(&output_dir).await?;

        let command = build_args(&request, &output_dir);
        let job = Job {
            id: id.clone(),
            target: request.target,
            profile: request.profile,
            options: request.options,
            status: JobStatus::Running,
            command,
            output_dir,
            start_time: Utc::now(),
            end_time: None,
            error: None,
        };

        let mut jobs = self.jobs.write().await;
        if let Err(e) = self.check_capacity(&jobs, &job.target) {
            drop(jobs);
            if let Err(io) = fs::remove_dir(&job.output_dir).await {
                warn!("Failed to remove unused directory {}: {}", job.output_dir.display(), io);
            }
            return Err(e);
        }

        info!("Registered scan {} ({} profile) for {}", id, job.profile, job.target);
        jobs.insert(id, job.clone());
        Ok(job)
    }

    fn check_capacity(&self, jobs: &HashMap<String, Job>, target: &str) -> ServiceResult<()> {
        if self.max_running == 0 {
            return Ok(());
        }
        let running = jobs.values().filter(|j| j.status == JobStatus::Running).count();
        if running >= self.max_running {
            warn!("Rejecting scan of {}: {} scans already running", target, running);
            return Err(ServiceError::CapacityExceeded(self.max_running));
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> ServiceResult<Job> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    /// All jobs, oldest first.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.start_time);
        jobs
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    pub async fn running_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|j| j.status == JobStatus::Running)
            .count()
    }

    /// Saves `stdout` to the results file and moves the job to `completed`.
    /// If the file cannot be written the job ends in `error` instead.
    pub async fn mark_completed(&self, id: &str, stdout: &str) -> ServiceResult<Job> {
        let dir = self.running_dir(id).await?;
        match fs::write(dir.join(RESULTS_FILE), stdout).await {
            Ok(()) => self.finish(id, JobStatus::Completed, None).await,
            Err(e) => {
                self.finish(id, JobStatus::Error, Some(format!("Failed to save results: {}", e)))
                    .await?;
                Err(e.into())
            }
        }
    }

    /// Saves `stderr` to the error log and moves the job to `error`.
    pub async fn mark_failed(&self, id: &str, error: &str, stderr: &str) -> ServiceResult<Job> {
        let dir = self.running_dir(id).await?;
        if let Err(e) = fs::write(dir.join(ERROR_FILE), stderr).await {
            warn!("Failed to write error log for scan {}: {}", id, e);
        }
        self.finish(id, JobStatus::Error, Some(error.to_string())).await
    }

    async fn running_dir(&self, id: &str) -> ServiceResult<PathBuf> {
        let jobs = self.jobs.read().await;
        let job = jobs.get(id).ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
        if job.status.is_terminal() {
            return Err(ServiceError::AlreadyFinished(id.to_string()));
        }
        Ok(job.output_dir.clone())
    }

    async fn finish(&self, id: &str, status: JobStatus, error: Option<String>) -> ServiceResult<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(id).ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
        if job.status.is_terminal() {
            return Err(ServiceError::AlreadyFinished(id.to_string()));
        }

        job.status = status;
        job.end_time = Some(Utc::now());
        job.error = error;

        match status {
            JobStatus::Completed => info!("Scan {} completed", id),
            _ => warn!("Scan {} failed: {}", id, job.error.as_deref().unwrap_or("unknown error")),
        }
        Ok(job.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn request(target: &str) -> ScanRequest {
        ScanRequest {
            target: target.to_string(),
            profile: ScanProfile::Quick,
            options: vec![("dbs".to_string(), OptionValue::Flag(true))],
        }
    }

    fn args_for(_: &ScanRequest, dir: &Path) -> Vec<String> {
        vec!["-u".to_string(), format!("--output-dir={}", dir.display())]
    }

    #[tokio::test]
    async fn test_create_sets_running_and_directory() {
        let root = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(root.path(), 0);

        let job = registry.create(request("http://example.com/"), args_for).await.unwrap();

        assert_eq!(job.status, JobStatus::Running);
        assert!(job.end_time.is_none());
        assert!(job.error.is_none());
        assert!(job.output_dir.is_dir());
        assert_eq!(job.output_dir, root.path().join(&job.id));
        assert_eq!(job.command[1], format!("--output-dir={}", job.output_dir.display()));
        assert_eq!(registry.get(&job.id).await.unwrap().target, "http://example.com/");
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(root.path(), 0);
        assert!(matches!(registry.get("missing").await, Err(ServiceError::NotFound(_))));
        assert!(matches!(
            registry.mark_completed("missing", "").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_completed_transition_writes_results() {
        let root = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(root.path(), 0);
        let job = registry.create(request("http://example.com/"), args_for).await.unwrap();

        let done = registry.mark_completed(&job.id, "all good\n").await.unwrap();

        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.end_time.is_some());
        assert_eq!(std::fs::read_to_string(done.results_path()).unwrap(), "all good\n");
    }

    #[tokio::test]
    async fn test_failed_transition_writes_error_log() {
        let root = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(root.path(), 0);
        let job = registry.create(request("http://example.com/"), args_for).await.unwrap();

        let failed = registry.mark_failed(&job.id, "exit status: 1", "boom").await.unwrap();

        assert_eq!(failed.status, JobStatus::Error);
        assert_eq!(failed.error.as_deref(), Some("exit status: 1"));
        assert!(failed.end_time.is_some());
        assert_eq!(std::fs::read_to_string(job.output_dir.join(ERROR_FILE)).unwrap(), "boom");
    }

    #[tokio::test]
    async fn test_status_never_reverts() {
        let root = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(root.path(), 0);
        let job = registry.create(request("http://example.com/"), args_for).await.unwrap();

        let first = registry.mark_failed(&job.id, "crashed", "").await.unwrap();
        let second = registry.mark_completed(&job.id, "late output").await;

        assert!(matches!(second, Err(ServiceError::AlreadyFinished(_))));
        let current = registry.get(&job.id).await.unwrap();
        assert_eq!(current.status, JobStatus::Error);
        assert_eq!(current.end_time, first.end_time);
        assert!(!job.results_path().exists());
    }

    #[tokio::test]
    async fn test_capacity_ceiling() {
        let root = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(root.path(), 2);

        let first = registry.create(request("http://a.com/"), args_for).await.unwrap();
        registry.create(request("http://b.com/"), args_for).await.unwrap();
        let rejected = registry.create(request("http://c.com/"), args_for).await;
        assert!(matches!(rejected, Err(ServiceError::CapacityExceeded(2))));
        assert_eq!(registry.len().await, 2);

        registry.mark_completed(&first.id, "").await.unwrap();
        assert!(registry.create(request("http://c.com/"), args_for).await.is_ok());
        assert_eq!(registry.running_count().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_creates_respect_ceiling() {
        let root = tempfile::tempdir().unwrap();
        let registry = Arc::new(JobRegistry::new(root.path(), 3));

        let handles: Vec<_> = (0..12)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry.create(request(&format!("http://host{}.com/", i)), args_for).await
                })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(e) => assert!(matches!(e, ServiceError::CapacityExceeded(3))),
            }
        }

        assert_eq!(admitted, 3);
        assert_eq!(registry.running_count().await, 3);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_creates_get_unique_ids() {
        let root = tempfile::tempdir().unwrap();
        let registry = Arc::new(JobRegistry::new(root.path(), 0));

        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry
                    .create(request(&format!("http://host{}.com/", i)), args_for)
                    .await
                    .unwrap()
                    .id
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            assert!(ids.insert(handle.await.unwrap()));
        }
        assert_eq!(registry.list().await.len(), 32);
    }
}
