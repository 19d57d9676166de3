//! Axum-based status and override API
//!
//! Handlers never touch engine state: reads come from the driver's snapshot
//! channel, writes are forwarded as [`DriverCommand`]s and applied by the
//! driver between cycles.

use crate::driver::{DriverCommand, DriverSnapshot};
use crate::engine::OutletMode;
use crate::error::{HeliosError, Result};
use axum::body::Bytes;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub commands_tx: mpsc::UnboundedSender<DriverCommand>,
    pub snapshot_rx: watch::Receiver<Arc<DriverSnapshot>>,
}

#[derive(Debug, Deserialize)]
pub struct ModeBody {
    /// `auto`, `on` or `off`
    pub mode: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReloadBody {
    pub path: Option<String>,
}

fn parse_mode(raw: &str) -> Option<OutletMode> {
    match raw.to_ascii_lowercase().as_str() {
        "auto" | "automatic" => Some(OutletMode::Automatic),
        "on" => Some(OutletMode::Manual(true)),
        "off" => Some(OutletMode::Manual(false)),
        _ => None,
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn forward(state: &AppState, cmd: DriverCommand) -> Response {
    match state.commands_tx.send(cmd) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "accepted" })),
        )
            .into_response(),
        Err(_) => error_response(StatusCode::SERVICE_UNAVAILABLE, "driver not running"),
    }
}

pub(crate) async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub(crate) async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.snapshot_rx.borrow().clone();
    Json((*snapshot).clone())
}

pub(crate) async fn outlets(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.snapshot_rx.borrow().clone();
    Json(snapshot.outlets.clone())
}

pub(crate) async fn set_outlet_mode(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ModeBody>,
) -> Response {
    let known = state.snapshot_rx.borrow().outlet(&id).is_some();
    if !known {
        return error_response(StatusCode::NOT_FOUND, format!("unknown outlet {}", id));
    }
    let Some(mode) = parse_mode(&body.mode) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("mode must be auto, on or off, got {}", body.mode),
        );
    };
    forward(&state, DriverCommand::SetOutletMode { id, mode })
}

/// An empty body reloads the file the driver started with
pub(crate) async fn reload_config(State(state): State<AppState>, body: Bytes) -> Response {
    let body: ReloadBody = if body.is_empty() {
        ReloadBody::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(b) => b,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        }
    };
    let path = body.path.map(PathBuf::from);
    forward(&state, DriverCommand::ReloadConfig { path })
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/outlets", get(outlets))
        .route("/api/outlets/{id}/mode", post(set_outlet_mode))
        .route("/api/config/reload", post(reload_config))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until `shutdown` resolves
pub async fn serve<F>(state: AppState, host: &str, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let logger = crate::logging::get_logger("web");

    let addr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", host));
            SocketAddr::from(([127, 0, 0, 1], port))
        }
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{}",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| HeliosError::web(e.to_string()))
}
