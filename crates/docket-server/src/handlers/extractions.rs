use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::info;
use uuid::Uuid;

use docket_core::api_types::{
    CreateExtractionRequest, ExtractionAcceptedResponse, ExtractionStatusResponse,
};

use super::error_response;
use crate::state::AppState;

/// POST /api/extractions: run extraction sessions for the documents in order.
pub async fn create_extraction(
    State(state): State<AppState>,
    Json(req): Json<CreateExtractionRequest>,
) -> impl IntoResponse {
    let document_ids: Vec<String> = req
        .document_ids
        .into_iter()
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect();
    if document_ids.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "document_ids must not be empty");
    }

    let strategy = req.strategy.unwrap_or(state.config.default_strategy);
    let documents = document_ids.len();
    let run = state.orchestrator.run_extraction(document_ids, strategy);
    let run_id = run.id();
    info!(run_id = %run_id, documents, strategy = %strategy, "Extraction run accepted");

    state.extractions.write().await.insert(run_id, run);

    (
        StatusCode::ACCEPTED,
        Json(ExtractionAcceptedResponse {
            run_id,
            strategy,
            documents,
        }),
    )
        .into_response()
}

/// GET /api/extractions/{id}: finished records plus the live session, if any.
pub async fn get_extraction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let Some(run) = state.extractions.read().await.get(&id).cloned() else {
        return error_response(StatusCode::NOT_FOUND, format!("Extraction run '{id}' not found"));
    };

    (
        StatusCode::OK,
        Json(ExtractionStatusResponse {
            run_id: id,
            finished: run.is_finished(),
            active: run.active().await,
            records: run.records().await,
        }),
    )
        .into_response()
}

/// DELETE /api/extractions/{id}/documents/{document_id}: cancel or skip one document.
pub async fn remove_document(
    State(state): State<AppState>,
    Path((id, document_id)): Path<(Uuid, String)>,
) -> impl IntoResponse {
    let Some(run) = state.extractions.read().await.get(&id).cloned() else {
        return error_response(StatusCode::NOT_FOUND, format!("Extraction run '{id}' not found"));
    };

    if !run.documents().iter().any(|d| *d == document_id) {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("Document '{document_id}' is not part of run '{id}'"),
        );
    }

    run.remove(&document_id);
    StatusCode::NO_CONTENT.into_response()
}
