use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use serde_json::{json, Value};

use super::AppState;
use crate::config::ScanProfile;
use crate::core::extractor::{self, ScanReport};
use crate::core::registry::JobStatus;
use crate::error::{ServiceError, ValidationError};
use crate::modules::sqlmap::build_scan_args;
use crate::utils::validator::validate_scan_request;

#[derive(Debug, Serialize)]
pub struct StartScanResponse {
    pub scan_id: String,
    pub status: JobStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ScanStatusResponse {
    pub scan_id: String,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScanSummary {
    pub scan_id: String,
    pub status: JobStatus,
    pub target: String,
    pub scan_type: ScanProfile,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "OK", "message": "sqlmapd is running" }))
}

/// `POST /scan`: validates, registers and launches a scan, then returns
/// without waiting for the scanner.
pub async fn start_scan(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<StartScanResponse>), ServiceError> {
    let raw: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|_| ValidationError::InvalidRequest)?
    };

    let request = validate_scan_request(&raw, &state.config.security)?;
    let profile_args = state.config.profiles.get(request.profile);

    let job = state
        .registry
        .create(request, |req, dir| {
            build_scan_args(&req.target, profile_args, dir, &req.options)
        })
        .await?;

    state.runner.start(&job);
    info!("Accepted scan {} for {}", job.id, job.target);

    Ok((
        StatusCode::CREATED,
        Json(StartScanResponse {
            scan_id: job.id,
            status: job.status,
            message: "Scan started successfully".to_string(),
        }),
    ))
}

pub async fn scan_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ScanStatusResponse>, ServiceError> {
    let job = state.registry.get(&id).await?;
    Ok(Json(ScanStatusResponse {
        scan_id: job.id,
        status: job.status,
        start_time: job.start_time,
        end_time: job.end_time,
        error: job.error,
    }))
}

pub async fn scan_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ScanReport>, ServiceError> {
    let job = state.registry.get(&id).await?;
    Ok(Json(extractor::extract(&job).await))
}

pub async fn list_scans(State(state): State<AppState>) -> Json<Vec<ScanSummary>> {
    let scans = state
        .registry
        .list()
        .await
        .into_iter()
        .map(|job| ScanSummary {
            scan_id: job.id,
            status: job.status,
            target: job.target,
            scan_type: job.profile,
            start_time: job.start_time,
            end_time: job.end_time,
        })
        .collect();
    Json(scans)
}
