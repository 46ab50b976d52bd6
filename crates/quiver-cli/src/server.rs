//! HTTP query server.
//!
//! Frames the five analytic queries as JSON over HTTP. Every success
//! response carries a single `count` field; every failure carries a
//! single `error` string, with 4xx for input errors and 5xx reserved
//! for internal ones. Response buffers are allocated per request.
//!
//! The artifact is immutable, so the store is shared across handlers
//! without locks; concurrent queries each see the same snapshot.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;

use quiver_query::{PatternSpec, QueryEngine};
use quiver_storage::GraphStore;

/// Server configuration loaded from environment variables.
///
/// - `QUIVER_PORT`: listen port (default: 8080)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("QUIVER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Self::default().port),
        }
    }
}

/// Application state shared across handlers.
pub struct AppState {
    store: GraphStore,
    artifact_path: PathBuf,
    start_time: Instant,
}

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct KhopRequest {
    pub node: String,
    pub k: u32,
}

#[derive(Debug, Deserialize)]
pub struct CommonNeighborsRequest {
    pub nodes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReachableRequest {
    pub src: String,
    pub dst: String,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check response for monitoring.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub database: DatabaseHealth,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    pub node_count: usize,
    pub edge_count: usize,
    pub path: String,
}

// =============================================================================
// Handlers
// =============================================================================

async fn handle_khop(
    State(state): State<Arc<AppState>>,
    Json(req): Json<KhopRequest>,
) -> Json<CountResponse> {
    let engine = QueryEngine::new(&state.store);
    Json(CountResponse {
        count: engine.khop(&req.node, req.k),
    })
}

async fn handle_common_neighbors(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CommonNeighborsRequest>,
) -> Json<CountResponse> {
    let engine = QueryEngine::new(&state.store);
    Json(CountResponse {
        count: engine.common_neighbors(&req.nodes),
    })
}

async fn handle_reachable(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReachableRequest>,
) -> Json<CountResponse> {
    let engine = QueryEngine::new(&state.store);
    Json(CountResponse {
        count: engine.reachable(&req.src, &req.dst),
    })
}

async fn handle_connected_components(
    State(state): State<Arc<AppState>>,
) -> Json<CountResponse> {
    let engine = QueryEngine::new(&state.store);
    Json(CountResponse {
        count: engine.connected_components(),
    })
}

async fn handle_subgraph(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<PatternSpec>,
) -> Result<Json<CountResponse>, (StatusCode, Json<ErrorResponse>)> {
    let engine = QueryEngine::new(&state.store);
    match engine.subgraph(&spec) {
        Ok(count) => Ok(Json(CountResponse { count })),
        Err(e) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    use quiver_core::Graph;

    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        database: DatabaseHealth {
            node_count: state.store.num_nodes(),
            edge_count: state.store.num_edges(),
            path: state.artifact_path.display().to_string(),
        },
    })
}

/// Builds the router over an opened store.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/khop", post(handle_khop))
        .route("/api/common-neighbors", post(handle_common_neighbors))
        .route("/api/reachable", post(handle_reachable))
        .route("/api/connected-components", get(handle_connected_components))
        .route("/api/subgraph", post(handle_subgraph))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Opens the artifact read-only and serves queries until ctrl-c.
pub async fn run_server(
    artifact_dir: &Path,
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = GraphStore::open(artifact_dir)?;
    let state = Arc::new(AppState {
        store,
        artifact_path: artifact_dir.to_path_buf(),
        start_time: Instant::now(),
    });
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(port = config.port, artifact = %artifact_dir.display(), "query server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
        })
        .await?;

    info!("server stopped");
    Ok(())
}
