//! Router construction and server lifecycle

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use undertow_core::{StreamOrchestrator, UndertowConfig};
use undertow_search::MediaSearchService;

use crate::handlers::{
    add_stream, delete_stream, get_stream, health, hls_preflight, list_streams, search,
    serve_hls_file,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<StreamOrchestrator>,
    pub search: MediaSearchService,
    /// Public base URL without trailing slash, used for `hlsUrl`
    pub base_url: String,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<StreamOrchestrator>,
        search: MediaSearchService,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            search,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Builds the full application router.
///
/// The HLS routes set their own CORS headers so players on other origins
/// can fetch segments; the JSON API gets a permissive CORS layer.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/add", get(add_stream))
        .route("/streams", get(list_streams))
        .route("/streams/{id}", get(get_stream).delete(delete_stream))
        .route("/search", get(search))
        .route("/health", get(health))
        .layer(CorsLayer::permissive());

    let hls = Router::new().route(
        "/hls/{id}/{file}",
        get(serve_hls_file).options(hls_preflight),
    );

    Router::new()
        .merge(api)
        .merge(hls)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves HTTP until Ctrl-C or SIGTERM, then shuts the orchestrator down.
///
/// # Errors
/// - `std::io::Error` - Listener could not be bound or the server failed
pub async fn run_server(
    config: &UndertowConfig,
    orchestrator: Arc<StreamOrchestrator>,
    search: MediaSearchService,
) -> std::io::Result<()> {
    let state = AppState::new(Arc::clone(&orchestrator), search, config.server.base_url());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.server.listen_addr).await?;
    info!(
        "Undertow listening on {} (public URL {})",
        listener.local_addr()?,
        config.server.base_url()
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    orchestrator.shutdown().await;
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
