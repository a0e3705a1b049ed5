// HTTP API module - exposes the ingestion, profile, scoring, and agent
// boundaries as REST endpoints
//
// All endpoints return JSON and are designed for local consumption only.
// Security: binds to 127.0.0.1 by default (single-tenant internal tool,
// no authentication by design).

mod agent;
mod jobs;
mod profiles;

use crate::agent::LiveAgent;
use crate::error::CoreError;
use crate::pipeline::IngestCoordinator;
use crate::scoring::ScoreExtractor;
use crate::store::Store;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

// Re-export endpoint handlers
pub use agent::{chat, get_adaptation};
pub use jobs::{create_job, get_job, list_jobs, reap_jobs, submit_chunk, update_job_status};
pub use profiles::{generate_scores, get_profile, get_scores};

/// Shared handles for all endpoint handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub coordinator: Arc<IngestCoordinator>,
    pub extractor: Arc<ScoreExtractor>,
    pub agent: Arc<LiveAgent>,
}

/// API error responses
/// Converted to HTTP status codes via IntoResponse
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    UpstreamFailed(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::UpstreamFailed(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        tracing::error!("API error: {} - {}", status, message);

        (status, message).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        let message = e.to_string();
        match e {
            CoreError::Validation(_) => ApiError::BadRequest(message),
            CoreError::NotFound(_) => ApiError::NotFound(message),
            CoreError::DuplicateKey(_) => ApiError::Conflict(message),
            CoreError::Generation(_) => ApiError::UpstreamFailed(message),
            CoreError::Storage(_) => ApiError::Internal(message),
        }
    }
}

/// Health response with relation sizes
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub storage: crate::store::StorageCounts,
}

/// GET /api/health - service liveness plus storage counts
pub async fn get_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let storage = state.store.counts()?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: crate::config::VERSION,
        storage,
    }))
}
