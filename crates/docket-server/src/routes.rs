use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

pub fn create_router() -> Router<AppState> {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_check))
        .route("/api/strategies", get(handlers::health::list_strategies))
        // Batches
        .route("/api/batches", post(handlers::batches::create_batch))
        .route("/api/batches/{id}", get(handlers::batches::get_batch))
        .route("/api/batches/{id}/files", post(handlers::batches::enqueue_files))
        .route(
            "/api/batches/{id}/jobs/{job_id}",
            delete(handlers::batches::discard_job),
        )
        // Extractions
        .route("/api/extractions", post(handlers::extractions::create_extraction))
        .route("/api/extractions/{id}", get(handlers::extractions::get_extraction))
        .route(
            "/api/extractions/{id}/documents/{document_id}",
            delete(handlers::extractions::remove_document),
        )
}
