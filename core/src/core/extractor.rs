use std::io::ErrorKind;

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;

use crate::core::registry::{Job, JobStatus};

/// Substring that marks a line as talking about an injection point.
const PARAMETER_TOKEN: &str = "parameter";

/// Phrases sqlmap prints once a parameter has been confirmed. The quote in
/// `' injectable` skips "does not seem to be injectable".
const VULNERABILITY_INDICATORS: &[&str] = &["is vulnerable", "' injectable"];

pub const FINDING_KIND: &str = "SQL Injection";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

/// Body of `GET /scan/{id}/results`.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scan_id: String,
    pub status: JobStatus,
    pub target: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vulnerabilities: Option<Vec<Finding>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Best-effort classification of sqlmap console output.
///
/// This is approximate: it does not parse sqlmap's report format. Any line
/// that mentions a parameter together with a vulnerability indicator
/// (case-insensitive) becomes one finding described by the trimmed line.
pub fn find_vulnerabilities(output: &str) -> Vec<Finding> {
    output
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            lower.contains(PARAMETER_TOKEN)
                && VULNERABILITY_INDICATORS.iter().any(|i| lower.contains(i))
        })
        .map(|line| Finding {
            kind: FINDING_KIND.to_string(),
            description: line.trim().to_string(),
        })
        .collect()
}

/// Builds the results view of a job. Missing or unreadable result files are
/// reported in the `error` field rather than as a failure.
pub async fn extract(job: &Job) -> ScanReport {
    let mut report = ScanReport {
        scan_id: job.id.clone(),
        status: job.status,
        target: job.target.clone(),
        start_time: job.start_time,
        end_time: job.end_time,
        raw_output: None,
        vulnerabilities: None,
        error: None,
    };

    match job.status {
        JobStatus::Running => {}
        JobStatus::Error => report.error = job.error.clone(),
        JobStatus::Completed => match tokio::fs::read_to_string(job.results_path()).await {
            Ok(content) => {
                report.vulnerabilities = Some(find_vulnerabilities(&content));
                report.raw_output = Some(content);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                report.error = Some("Results file not found".to_string());
            }
            Err(e) => {
                warn!("Failed to read results of scan {}: {}", job.id, e);
                report.error = Some(format!("Failed to read results: {}", e));
            }
        },
    }

    report
}
