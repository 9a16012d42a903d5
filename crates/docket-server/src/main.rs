use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use docket_clients::{FsDocumentSource, HttpDocumentParser, HttpExtractionService};
use docket_core::{DocumentParser, ResultStore};
use docket_graph::Neo4jResultStore;
use docket_pipeline::Orchestrator;

mod handlers;
mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> docket_core::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("docket=info,tower_http=info")),
        )
        .init();

    let config = docket_core::AppConfig::from_env();
    let host = config.server_host.clone();
    let port = config.server_port;

    let pipeline = config.pipeline();
    let parser: Arc<dyn DocumentParser> =
        Arc::new(HttpDocumentParser::new(&config.parser_url, pipeline.parse_timeout)?);
    let store: Arc<dyn ResultStore> = Arc::new(Neo4jResultStore::new(&config).await);
    let source = Arc::new(FsDocumentSource::new(config.document_root.as_ref().map(PathBuf::from)));
    let extraction = Arc::new(HttpExtractionService::new(
        &config.extraction_url,
        config.extraction().fallback_timeout,
    )?);

    let orchestrator = Orchestrator::new(
        source,
        parser.clone(),
        store.clone(),
        extraction,
        pipeline,
        config.extraction(),
    );

    let state = AppState::new(config, orchestrator, parser, store);

    let app = routes::create_router()
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{host}:{port}");
    tracing::info!("Docket server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
