pub mod auth;
pub mod routes;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::config::ServiceConfig;
use crate::core::registry::JobRegistry;
use crate::core::runner::ProcessRunner;
use crate::error::ServiceError;
use crate::utils;

/// Everything a request handler needs, shared by cheap clones.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub registry: Arc<JobRegistry>,
    pub runner: ProcessRunner,
}

impl AppState {
    /// Wires a fresh registry and runner from the configuration.
    pub fn new(config: ServiceConfig) -> Self {
        let registry = Arc::new(JobRegistry::new(
            config.paths.scan_directory.clone(),
            config.max_concurrent_scans,
        ));
        let scanner = utils::resolve_scanner_path(&config.paths.sqlmap_path)
            .unwrap_or_else(|| config.paths.sqlmap_path.clone().into());
        let runner = ProcessRunner::new(Arc::clone(&registry), scanner, config.scan_timeout());

        Self {
            config: Arc::new(config),
            registry,
            runner,
        }
    }
}

/// Builds the API router. `/health` is always open; the scan routes sit
/// behind the API key check when authentication is enabled.
pub fn router(state: AppState) -> Router {
    let scans = Router::new()
        .route("/scan", post(routes::start_scan))
        .route("/scans", get(routes::list_scans))
        .route("/scan/{id}/status", get(routes::scan_status))
        .route("/scan/{id}/results", get(routes::scan_results))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key));

    Router::new()
        .route("/health", get(routes::health))
        .merge(scans)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `0.0.0.0:<port>` and serves the API until the process stops.
pub async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    let port = config.port;
    let app = router(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::CapacityExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::AlreadyFinished(_) => StatusCode::CONFLICT,
            ServiceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ServiceError::NotFound(_) => "Scan not found".to_string(),
            ServiceError::Io(e) => {
                error!("Internal error: {}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
