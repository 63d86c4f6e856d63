//! Core of `sqlmapd`: validates scan requests, launches sqlmap as a child
//! process per job, tracks jobs in memory and extracts findings from their
//! output. The `http` module exposes all of it as a JSON API.

pub mod config;
pub mod core;
pub mod error;
pub mod http;
pub mod modules;
pub mod utils;

pub use crate::config::{ProfilePresets, ScanProfile, ServiceConfig};
pub use crate::core::extractor::{extract, find_vulnerabilities, Finding, ScanReport};
pub use crate::core::registry::{Job, JobRegistry, JobStatus};
pub use crate::core::runner::ProcessRunner;
pub use crate::error::{ServiceError, ServiceResult, ValidationError};
pub use crate::http::{router, serve, AppState};
pub use crate::modules::sqlmap::build_scan_args;
pub use crate::utils::resolve_scanner_path;
pub use crate::utils::validator::{validate_scan_request, OptionValue, ScanRequest};
