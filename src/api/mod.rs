//! Control API for the call watcher.
//!
//! Localhost-only HTTP surface:
//! - runtime status (GET /status)
//! - policy reload (POST /policy/reload)
//! - orderly stop (POST /stop)

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::Json, routing::{get, post}, Router};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tracing::{error, info};

use crate::config::Config;
use crate::watcher::{CallPolicy, WatcherCommand, WatcherStatusHandle};

#[derive(Clone)]
pub struct ApiState {
    pub tx: mpsc::Sender<WatcherCommand>,
    pub status: WatcherStatusHandle,
}

pub struct ApiServer {
    port: u16,
    state: ApiState,
}

impl ApiServer {
    pub fn new(port: u16, tx: mpsc::Sender<WatcherCommand>, status: WatcherStatusHandle) -> Self {
        Self {
            port,
            state: ApiState { tx, status },
        }
    }

    pub async fn start(self) -> Result<()> {
        let app = Router::new()
            .route("/", get(service_info))
            .route("/status", get(watcher_status))
            .route("/policy/reload", post(reload_policy))
            .route("/stop", post(stop_watcher))
            .with_state(self.state)
            .layer(ServiceBuilder::new());

        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("Control API listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  GET  /              - Service info");
        info!("  GET  /status        - Watcher runtime status");
        info!("  POST /policy/reload - Re-read allow/block lists from config");
        info!("  POST /stop          - Stop the watcher");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "attendant",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn watcher_status(State(state): State<ApiState>) -> Json<Value> {
    let status = state.status.get().await;

    Json(json!({
        "phase": status.phase.as_str(),
        "current_caller": status.current_caller,
        "calls_answered": status.calls_answered,
        "calls_declined": status.calls_declined,
        "waiting_for_auth": status.waiting_for_auth,
        "last_outcome": status.last_outcome,
        "last_error": status.last_error,
        "started_at": status.started_at.to_rfc3339(),
    }))
}

async fn reload_policy(State(state): State<ApiState>) -> Result<Json<Value>, StatusCode> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to reload config: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let policy = CallPolicy::from_config(&config.watcher);
    match state.tx.send(WatcherCommand::ReloadPolicy(policy)).await {
        Ok(_) => Ok(Json(json!({"success": true}))),
        Err(e) => {
            error!("Failed to deliver policy reload: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn stop_watcher(State(state): State<ApiState>) -> Result<Json<Value>, StatusCode> {
    info!("Stop requested via API");
    match state.tx.send(WatcherCommand::Stop).await {
        Ok(_) => Ok(Json(json!({"success": true}))),
        Err(e) => {
            error!("Failed to deliver stop command: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
