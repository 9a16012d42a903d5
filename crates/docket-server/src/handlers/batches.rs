use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{info, warn};
use uuid::Uuid;

use docket_core::api_types::{
    BatchAcceptedResponse, BatchStatusResponse, CreateBatchRequest, EnqueueFilesRequest,
};

use super::error_response;
use crate::state::AppState;

fn clean_files(files: Vec<String>) -> Vec<String> {
    files
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

/// POST /api/batches: queue files and start processing in the background.
pub async fn create_batch(
    State(state): State<AppState>,
    Json(req): Json<CreateBatchRequest>,
) -> impl IntoResponse {
    let files = clean_files(req.files);
    if files.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "files must not be empty");
    }

    let run = state.orchestrator.batch(req.session_id);
    let job_ids = run.enqueue(files);
    let batch_id = run.id();
    info!(batch_id = %batch_id, jobs = job_ids.len(), "Batch accepted");

    let progress = run.progress();
    state.batches.write().await.insert(batch_id, run);

    (
        StatusCode::ACCEPTED,
        Json(BatchAcceptedResponse {
            batch_id,
            job_ids,
            progress,
        }),
    )
        .into_response()
}

/// POST /api/batches/{id}/files: append files to an existing batch.
pub async fn enqueue_files(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<EnqueueFilesRequest>,
) -> impl IntoResponse {
    let files = clean_files(req.files);
    if files.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "files must not be empty");
    }

    let Some(run) = state.batches.read().await.get(&id).cloned() else {
        warn!(batch_id = %id, "Batch not found");
        return error_response(StatusCode::NOT_FOUND, format!("Batch '{id}' not found"));
    };

    let job_ids = run.enqueue(files);
    info!(batch_id = %id, jobs = job_ids.len(), "Files enqueued");

    (
        StatusCode::ACCEPTED,
        Json(BatchAcceptedResponse {
            batch_id: id,
            job_ids,
            progress: run.progress(),
        }),
    )
        .into_response()
}

/// GET /api/batches/{id}: progress and finished job records.
pub async fn get_batch(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let Some(run) = state.batches.read().await.get(&id).cloned() else {
        return error_response(StatusCode::NOT_FOUND, format!("Batch '{id}' not found"));
    };

    (
        StatusCode::OK,
        Json(BatchStatusResponse {
            batch_id: id,
            progress: run.progress(),
            records: run.records().await,
        }),
    )
        .into_response()
}

/// DELETE /api/batches/{id}/jobs/{job_id}: drop a queued or running job.
pub async fn discard_job(
    State(state): State<AppState>,
    Path((id, job_id)): Path<(Uuid, Uuid)>,
) -> impl IntoResponse {
    let Some(run) = state.batches.read().await.get(&id).cloned() else {
        return error_response(StatusCode::NOT_FOUND, format!("Batch '{id}' not found"));
    };

    if run.discard(job_id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(
            StatusCode::NOT_FOUND,
            format!("Job '{job_id}' is not queued or running in batch '{id}'"),
        )
    }
}
