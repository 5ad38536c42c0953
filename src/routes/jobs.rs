//! Enrichment jobs over already-uploaded artifacts.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{CreateJobRequest, JobStatusResponse};
use crate::models::job::EnrichmentJob;

/// POST /api/v1/jobs — create an enrichment job for an artifact the caller
/// already placed in object storage. Idempotent per (owner, artifact): a
/// repeat request returns the existing job.
pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobStatusResponse>), (StatusCode, Json<Value>)> {
    if let Err(e) = req.validate() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        ));
    }

    if let Some(existing) = state
        .jobs
        .find_by_artifact(req.owner_id, &req.artifact_key)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to look up existing job");
            internal_error()
        })?
    {
        return Ok((StatusCode::OK, Json(JobStatusResponse::from(&existing))));
    }

    let job = EnrichmentJob::from_artifact(req.owner_id, req.artifact_key, req.source);
    state.jobs.insert(&job).await.map_err(|e| {
        tracing::error!(error = %e, "failed to persist job");
        internal_error()
    })?;
    state.queue.enqueue(job.id).await.map_err(|e| {
        tracing::error!(job_id = %job.id, error = %e, "failed to enqueue job wake");
        internal_error()
    })?;

    metrics::counter!("enrichment_jobs_created").increment(1);
    tracing::info!(job_id = %job.id, source = %job.source, "enrichment job created");

    Ok((StatusCode::ACCEPTED, Json(JobStatusResponse::from(&job))))
}

/// GET /api/v1/jobs/{job_id} — job status and counters.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, (StatusCode, Json<Value>)> {
    let job = state.jobs.get(job_id).await.map_err(|e| {
        tracing::error!(error = %e, "failed to load job");
        internal_error()
    })?;

    match job {
        Some(job) => Ok(Json(JobStatusResponse::from(&job))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "job not found" })),
        )),
    }
}

fn internal_error() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
}
