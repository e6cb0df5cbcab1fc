use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use chrono::Utc;
use controller::{bootstrap_registry, SignalController, TickScheduler};
use serde::Deserialize;
use server_api::{
    get_signal, list_signals, phase_history, signal_stats, update_mode, update_phase, ApiContext,
};
use shared::{
    domain::SignalId,
    error::{ApiError, ErrorCode},
    protocol::{PhaseChange, SignalSnapshot, SignalStats, SystemStatus},
};
use storage::Storage;
use tokio::sync::watch;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod ws;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

const MAX_REQUEST_BYTES: usize = 16 * 1024;

#[derive(Debug, Deserialize)]
struct UpdateModeRequest {
    mode: String,
}

#[derive(Debug, Deserialize)]
struct UpdatePhaseRequest {
    phase: String,
    #[serde(default)]
    time_remaining: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let registry = bootstrap_registry(&storage, settings.seed_defaults)
        .await
        .context("failed to load traffic lights")?;
    info!(signals = registry.len(), "traffic lights loaded");

    let controller = SignalController::new(registry, settings.event_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = TickScheduler::new(controller.clone(), settings.scheduler())
        .with_store(Arc::new(storage.clone()))
        .spawn(shutdown_rx);

    let state = AppState::new(ApiContext { controller, storage }, settings.tick_interval_ms);
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;
    scheduler.await.context("tick scheduler panicked")?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal(scheduler: watch::Sender<bool>) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
    }
    info!("shutdown requested");
    let _ = scheduler.send(true);
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/system/status", get(http_system_status))
        .route("/api/traffic-lights", get(http_list_signals))
        .route("/api/traffic-lights/stats/overview", get(http_signal_stats))
        .route("/api/traffic-lights/:id", get(http_get_signal))
        .route("/api/traffic-lights/:id/history", get(http_phase_history))
        .route("/api/traffic-lights/:id/mode", patch(http_update_mode))
        .route("/api/traffic-lights/:id/phase", patch(http_update_phase))
        .route("/ws", get(ws::ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn http_error(error: ApiError) -> HttpError {
    let status = match error.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(error))
}

async fn http_system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    Json(SystemStatus {
        uptime_seconds: state.started_at.elapsed().as_secs(),
        signals: state.api.controller.len().await,
        connected_viewers: state.viewers.count().await,
        tick_interval_ms: state.tick_interval_ms,
        timestamp: Utc::now(),
    })
}

async fn http_list_signals(State(state): State<Arc<AppState>>) -> Json<Vec<SignalSnapshot>> {
    Json(list_signals(&state.api).await)
}

async fn http_signal_stats(State(state): State<Arc<AppState>>) -> Json<SignalStats> {
    Json(signal_stats(&state.api).await)
}

async fn http_get_signal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SignalSnapshot>, HttpError> {
    let signal = get_signal(&state.api, &SignalId(id))
        .await
        .map_err(http_error)?;
    Ok(Json(signal))
}

async fn http_phase_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<PhaseChange>>, HttpError> {
    let history = phase_history(&state.api, &SignalId(id), q.limit)
        .await
        .map_err(http_error)?;
    Ok(Json(history))
}

async fn http_update_mode(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateModeRequest>,
) -> Result<Json<SignalSnapshot>, HttpError> {
    let signal = update_mode(&state.api, &SignalId(id), &req.mode)
        .await
        .map_err(http_error)?;
    Ok(Json(signal))
}

async fn http_update_phase(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePhaseRequest>,
) -> Result<Json<SignalSnapshot>, HttpError> {
    let signal = update_phase(&state.api, &SignalId(id), &req.phase, req.time_remaining)
        .await
        .map_err(http_error)?;
    Ok(Json(signal))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
