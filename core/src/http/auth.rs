use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::warn;

use super::AppState;
use crate::config::DEFAULT_API_KEY;
use crate::error::ServiceError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Reads the key from `X-API-Key`, falling back to `Authorization: Bearer`.
fn provided_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        })
        .map(str::trim)
}

/// Rejects requests without the configured API key. A no-op unless
/// `security.require_auth` is set. The shipped placeholder key never matches.
pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let security = &state.config.security;
    if !security.require_auth {
        return next.run(request).await;
    }

    let authorized = matches!(
        provided_key(request.headers()),
        Some(key) if !key.is_empty() && key != DEFAULT_API_KEY && key == security.api_key
    );
    if authorized {
        next.run(request).await
    } else {
        warn!("Rejected unauthenticated request to {}", request.uri().path());
        ServiceError::Unauthorized.into_response()
    }
}
