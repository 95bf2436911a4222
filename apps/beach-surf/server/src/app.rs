//! HTTP surface: health, metrics and the websocket upgrade.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, State, WebSocketUpgrade},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;
use uuid::Uuid;

use crate::channel::split_socket;
use crate::context::SurfContext;
use crate::session::run_session;

#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<SurfContext>,
    pub model_uri: String,
    pub quant: String,
    /// Absent when no Prometheus recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
    pub quant: String,
    pub engine_loaded: bool,
    pub warmed_up: bool,
    pub active_sessions: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Serves until `shutdown` resolves.
pub async fn serve<S>(listener: TcpListener, state: AppState, shutdown: S) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model: state.model_uri.clone(),
        quant: state.quant.clone(),
        engine_loaded: state.ctx.engine.is_loaded(),
        warmed_up: state.ctx.warmup.is_warm(),
        active_sessions: state.ctx.active_sessions(),
    })
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let connection_id = Uuid::new_v4();
        info!(peer = %peer, connection_id = %connection_id, "client connected");
        let (inbound, outbound) = split_socket(socket);
        let end = run_session(
            state.ctx,
            inbound,
            outbound,
            format!("{peer}/{connection_id}"),
        )
        .await;
        info!(
            connection_id = %connection_id,
            frames = end.frame_count,
            failed = end.error.is_some(),
            "connection finished"
        );
    })
}
