use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

pub const SERVICE_NAME: &str = "fr0g-ai-mcp";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// GET /health: liveness probe.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "timestamp": chrono::Utc::now(),
        "version": VERSION,
        "ports": {
            "http": state.config.http.port,
            "grpc": state.config.grpc.port,
        },
    }))
}

/// GET /status: uptime, intelligence metrics, and system load.
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let metrics = state.engine.metrics();
    let awareness = state.engine.awareness();
    let memory = state.memory.stats();
    Json(json!({
        "status": "ok",
        "uptime": state.uptime_secs(),
        "intelligence": metrics,
        "system": {
            "active_workflows": state.workflows.active_count(),
            "completed_workflows": state.workflows.completed_count(),
            "system_load": state.orchestrator.system_load(),
            "last_update": awareness.last_update,
            "memory": memory,
            "delivery_rate": state.delivery.delivery_rate(),
            "stream_peers": state.stream_clients.len(),
        },
    }))
}
