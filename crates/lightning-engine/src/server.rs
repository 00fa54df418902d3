//! HTTP server implementation using Axum.

use crate::search::{SearchError, SearchExecutor};
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use lightning_core::engine::protocol::{EngineSearchRequest, EngineSearchResponse, QueryKind};
use anyhow::Context;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers.
pub struct AppState {
    pub executor: SearchExecutor,
    /// Table searched by `GET /search` when none is given
    pub default_table: String,
}

/// Query string of `GET /search`.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub table: Option<String>,
    #[serde(default)]
    pub mode: QueryKind,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", get(handle_search_get).post(handle_search_post))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the search HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(state: AppState, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let app = router(Arc::new(state));

    // Host names resolve; `[::1]` and `::1` both bind
    let bind_host = host.trim_start_matches('[').trim_end_matches(']');
    let listener = tokio::net::TcpListener::bind((bind_host, port))
        .await
        .with_context(|| format!("binding {}:{}", host, port))?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn handle_search_post(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EngineSearchRequest>,
) -> Result<Json<EngineSearchResponse>, SearchError> {
    state.executor.search(request).await.map(Json)
}

async fn handle_search_get(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<EngineSearchResponse>, SearchError> {
    let request = EngineSearchRequest {
        table: params
            .table
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| state.default_table.clone()),
        query: params.q,
        mode: params.mode,
    };
    state.executor.search(request).await.map(Json)
}
