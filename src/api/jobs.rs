// Job endpoints - the chunked ingestion boundary
//
// The caller drives the loop: create a job, submit chunks strictly
// sequentially, then mark the job completed or failed. Chunk failures are
// returned as typed errors and nothing is retried server-side.

use super::{ApiError, AppState};
use crate::pipeline::ChunkOutcome;
use crate::records::ConversationRecord;
use crate::store::{Job, JobStatus};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub filename: String,
    pub total_records: i64,
}

/// POST /api/jobs - create an ingestion job
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<Json<Job>, ApiError> {
    if request.filename.is_empty() {
        return Err(ApiError::BadRequest("filename is required".to_string()));
    }
    let job = state
        .coordinator
        .create_job(&request.filename, request.total_records)?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<usize>,
}

/// GET /api/jobs - recent jobs, newest first
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsQuery>,
) -> Result<Json<Vec<Job>>, ApiError> {
    let jobs = state.store.list_jobs(params.limit.unwrap_or(50))?;
    Ok(Json(jobs))
}

/// GET /api/jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(state.store.get_job(&id)?))
}

#[derive(Debug, Deserialize)]
pub struct SubmitChunkRequest {
    pub records: Vec<ConversationRecord>,
}

/// POST /api/jobs/:id/chunks - submit one chunk for processing
pub async fn submit_chunk(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SubmitChunkRequest>,
) -> Result<Json<ChunkOutcome>, ApiError> {
    let outcome = state.coordinator.submit_chunk(&id, &request.records).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct UpdateJobStatusRequest {
    pub status: String,
    pub processed_records: Option<i64>,
    pub error_message: Option<String>,
}

/// POST /api/jobs/:id/status - caller-driven lifecycle transition
pub async fn update_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateJobStatusRequest>,
) -> Result<Json<Job>, ApiError> {
    let status = JobStatus::parse(&request.status)?;
    let job = state.coordinator.update_job_status(
        &id,
        status,
        request.processed_records,
        request.error_message.as_deref(),
    )?;
    Ok(Json(job))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReapJobsRequest {
    /// Staleness window override in seconds
    pub idle_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ReapJobsResponse {
    pub reaped: u64,
}

/// POST /api/jobs/reap - close out jobs orphaned by a crashed client
pub async fn reap_jobs(
    State(state): State<AppState>,
    Json(request): Json<ReapJobsRequest>,
) -> Result<Json<ReapJobsResponse>, ApiError> {
    let reaped = state
        .coordinator
        .reap_stale(request.idle_secs.map(std::time::Duration::from_secs))?;
    Ok(Json(ReapJobsResponse { reaped }))
}
