use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{info, warn};

use docket_core::api_types::{HealthResponse, StrategyListResponse};
use docket_core::ChunkingStrategy;

use crate::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    info!("Health check requested");

    let (parser, store) = tokio::join!(state.parser.ping(), state.store.ping());
    let parser_connected = parser
        .inspect_err(|e| warn!("Parser connectivity check failed: {e}"))
        .is_ok();
    let store_connected = store
        .inspect_err(|e| warn!("Store connectivity check failed: {e}"))
        .is_ok();

    let active_batches = state
        .batches
        .read()
        .await
        .values()
        .filter(|b| b.progress().running)
        .count();
    let active_extractions = state
        .extractions
        .read()
        .await
        .values()
        .filter(|r| !r.is_finished())
        .count();

    let status = if parser_connected && store_connected {
        "ok".to_string()
    } else {
        "degraded".to_string()
    };

    let response = HealthResponse {
        status,
        version: VERSION.to_string(),
        parser_connected,
        store_connected,
        active_batches,
        active_extractions,
    };

    (StatusCode::OK, Json(response))
}

/// GET /api/strategies: every chunking strategy with its trade-off profile.
pub async fn list_strategies(State(state): State<AppState>) -> impl IntoResponse {
    let strategies = ChunkingStrategy::all().iter().map(|s| s.profile()).collect();
    (
        StatusCode::OK,
        Json(StrategyListResponse {
            default: state.config.default_strategy,
            strategies,
        }),
    )
}
