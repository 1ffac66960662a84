//! HTTP and WebSocket server
//!
//! Routes:
//! - `GET /health` liveness check
//! - `POST /upload` multipart document upload (field `file`)
//! - `GET /ws` persistent chat connection

mod origin;
mod upload;
mod ws;

pub use origin::origin_allowed;
pub use upload::UploadResponse;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::context::{ContextStore, spawn_sweeper};
use crate::error::{DocchatError, Result};
use crate::extract::{DefaultExtractor, DocumentExtractor};
use crate::generation::{GenerationClient, OllamaClient};
use crate::session::ensure_session;

/// Shared application state for all handlers
pub struct AppState {
    pub config: Config,
    /// Uploaded contexts keyed by correlation token
    pub store: Arc<ContextStore>,
    pub generator: Arc<dyn GenerationClient>,
    pub extractor: Arc<dyn DocumentExtractor>,
}

impl AppState {
    /// Build state with an empty context store sized from `config.session`
    pub fn new(
        config: Config,
        generator: Arc<dyn GenerationClient>,
        extractor: Arc<dyn DocumentExtractor>,
    ) -> Self {
        let store = Arc::new(ContextStore::new(Duration::from_secs(
            config.session.ttl_secs,
        )));
        Self {
            config,
            store,
            generator,
            extractor,
        }
    }
}

/// The document chat server
pub struct DocchatServer {
    config: Config,
}

impl DocchatServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Start the server and run until a shutdown signal arrives
    pub async fn serve(&self) -> Result<()> {
        let generator = Arc::new(OllamaClient::new(&self.config.upstream)?);
        let state = Arc::new(AppState::new(
            self.config.clone(),
            generator,
            Arc::new(DefaultExtractor::new()),
        ));

        let addr: SocketAddr = self
            .config
            .server
            .listen_addr
            .parse()
            .map_err(|e| DocchatError::Config(format!("Invalid listen address: {e}")))?;

        let sweeper = spawn_sweeper(
            state.store.clone(),
            Duration::from_secs(self.config.session.sweep_interval_secs),
        );

        tracing::info!("Starting docchat server on {addr}");
        tracing::info!(
            "Upstream: {} (model {})",
            self.config.upstream.base_url,
            self.config.upstream.model
        );
        if self.config.server.allowed_origins.is_empty() {
            tracing::info!("Allowed origins: same-origin only");
        } else {
            tracing::info!(
                "Allowed origins: {}",
                self.config.server.allowed_origins.join(", ")
            );
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DocchatError::Server(format!("Failed to bind to {addr}: {e}")))?;

        let served = axum::serve(listener, create_router(state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DocchatError::Server(format!("Server error: {e}")));

        sweeper.abort();
        served?;

        tracing::info!("Server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    let session = middleware::from_fn_with_state(state.config.session.clone(), ensure_session);

    let session_routes = Router::new()
        .route(
            "/upload",
            post(upload::upload_handler)
                .layer(DefaultBodyLimit::max(state.config.server.max_upload_bytes)),
        )
        .route("/ws", get(ws::ws_handler))
        .route_layer(session);

    Router::new()
        .route("/health", get(health_handler))
        .merge(session_routes)
        .layer(cors_layer(&state.config.server.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the upload endpoint; credentials are allowed so the session
/// cookie travels with cross-origin uploads
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim_end_matches('/')) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring invalid allowed origin '{origin}': {e}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_credentials(true)
}

/// Health check endpoint - returns JSON status
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
