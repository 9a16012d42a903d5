pub mod batches;
pub mod extractions;
pub mod health;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}
