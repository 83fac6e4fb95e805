//! GET /health for both servers.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde_json::{Value, json};

use crate::state::BridgeState;

/// Bridge health: the registry's current size and its sessions.
pub async fn bridge_health(State(state): State<BridgeState>) -> Json<Value> {
    let registry = state.hub.registry();
    Json(json!({
        "status": "ok",
        "activeConnections": registry.len(),
        "sessions": registry.snapshot(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub async fn chat_health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
