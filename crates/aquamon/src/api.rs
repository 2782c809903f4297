use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use chrono::Local;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::dashboard::Dashboard;
use crate::dashboard::Pump;
use crate::source::Patch;
use crate::source::SourceError;
use crate::view::DashboardView;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
    record_path: String,
}

/// Response for the pump endpoints
#[derive(Serialize)]
struct PatchResponse {
    written: Patch,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    dashboard: Arc<Dashboard>,
}

/// Failure of a pump command, reported to the client.
enum ApiError {
    UnknownPump(String),
    Source(SourceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::UnknownPump(pump) => {
                (StatusCode::NOT_FOUND, format!("Unknown pump '{}'", pump))
            }
            ApiError::Source(e) => {
                tracing::error!("Pump command failed: {}", e);
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<SourceError> for ApiError {
    fn from(e: SourceError) -> Self {
        ApiError::Source(e)
    }
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    Json(InfoResponse {
        version: state.version.to_string(),
        hostname,
        record_path: state.dashboard.record_path().to_string(),
    })
}

/// Handler for GET /v1/snapshot
#[tracing::instrument(skip(state))]
async fn snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.dashboard.snapshot().as_deref().cloned())
}

/// Handler for GET /v1/dashboard
#[tracing::instrument(skip(state))]
async fn dashboard(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.dashboard.snapshot();
    DashboardView::project(snapshot.as_deref(), Local::now().naive_local()).to_string()
}

/// Handler for POST /v1/pumps/automatic
#[tracing::instrument(skip(state))]
async fn set_automatic(State(state): State<Arc<AppState>>) -> Result<Json<PatchResponse>, ApiError> {
    let written = state.dashboard.set_automatic().await?;
    Ok(Json(PatchResponse { written }))
}

/// Handler for POST /v1/pumps/:pump/toggle
#[tracing::instrument(skip(state))]
async fn toggle_pump(
    State(state): State<Arc<AppState>>,
    Path(pump): Path<String>,
) -> Result<Json<PatchResponse>, ApiError> {
    let pump: Pump = pump.parse().map_err(|_| ApiError::UnknownPump(pump))?;
    let written = state.dashboard.toggle_pump(pump).await?;
    Ok(Json(PatchResponse { written }))
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/snapshot", get(snapshot))
        .route("/v1/dashboard", get(dashboard))
        .route("/v1/pumps/automatic", post(set_automatic))
        .route("/v1/pumps/:pump/toggle", post(toggle_pump))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Binds to `listen:port` and serves until `shutdown_rx` fires. The dashboard
/// must be mounted (and its event loop running) for `/v1/snapshot` to see
/// data; pump endpoints work regardless.
pub async fn serve(
    listen: String,
    port: u16,
    dashboard: Arc<Dashboard>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, dashboard });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
