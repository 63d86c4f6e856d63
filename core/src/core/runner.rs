use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::core::registry::{Job, JobRegistry};
use crate::error::ServiceResult;

/// How a scanner process ended, before it is recorded on the job.
#[derive(Debug)]
enum Outcome {
    Finished(Output),
    SpawnFailed(std::io::Error),
    WaitFailed(std::io::Error),
    TimedOut,
}

/// Launches one sqlmap process per job and records how it ended.
///
/// Each job runs as its own OS process watched by its own tokio task; jobs
/// are never serialized against each other. The registry is the only thing
/// the watcher touches, and only to move its own job out of `running`.
#[derive(Clone)]
pub struct ProcessRunner {
    registry: Arc<JobRegistry>,
    scanner: PathBuf,
    scan_timeout: Duration,
}

impl ProcessRunner {
    pub fn new(registry: Arc<JobRegistry>, scanner: impl Into<PathBuf>, scan_timeout: Duration) -> Self {
        Self {
            registry,
            scanner: scanner.into(),
            scan_timeout,
        }
    }

    /// Starts the scanner for `job` in the background and returns at once.
    /// The handle resolves after the job has reached a terminal state.
    pub fn start(&self, job: &Job) -> JoinHandle<()> {
        let runner = self.clone();
        let id = job.id.clone();
        let args = job.command.clone();

        tokio::spawn(async move {
            let outcome = runner.execute(&id, &args).await;
            if let Err(e) = runner.record(&id, outcome).await {
                error!("Failed to record outcome of scan {}: {}", id, e);
            }
        })
    }

    async fn execute(&self, id: &str, args: &[String]) -> Outcome {
        debug!("Scan {}: {} {}", id, self.scanner.display(), args.join(" "));

        let child = Command::new(&self.scanner)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(c) => c,
            Err(e) => return Outcome::SpawnFailed(e),
        };

        info!("Scan {} started (pid {})", id, child.id().unwrap_or_default());

        // Dropping the wait future on timeout drops the child, which kills it.
        match timeout(self.scan_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Outcome::Finished(output),
            Ok(Err(e)) => Outcome::WaitFailed(e),
            Err(_) => Outcome::TimedOut,
        }
    }

    async fn record(&self, id: &str, outcome: Outcome) -> ServiceResult<Job> {
        match outcome {
            Outcome::Finished(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                self.registry.mark_completed(id, &stdout).await
            }
            Outcome::Finished(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let message = failure_message(&output.status.to_string(), &stderr);
                self.registry.mark_failed(id, &message, &stderr).await
            }
            Outcome::SpawnFailed(e) => {
                let message = format!("Failed to start {}: {}", self.scanner.display(), e);
                self.registry.mark_failed(id, &message, "").await
            }
            Outcome::WaitFailed(e) => {
                let message = format!("Failed to collect scanner output: {}", e);
                self.registry.mark_failed(id, &message, "").await
            }
            Outcome::TimedOut => {
                let message = format!("Scan timed out after {}s", self.scan_timeout.as_secs());
                self.registry.mark_failed(id, &message, "").await
            }
        }
    }
}

/// Uses the last non-empty stderr line as the reason when there is one.
fn failure_message(status: &str, stderr: &str) -> String {
    match stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()) {
        Some(last) => format!("Scanner failed ({}): {}", status, last),
        None => format!("Scanner failed ({})", status),
    }
}
