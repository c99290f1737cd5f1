//! Direct duck control: talk start/stop and named gestures.

use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use devduck_hardware::Action;
use serde_json::{json, Value};
use std::sync::Arc;

pub async fn talk_start(State(state): State<Arc<AppState>>) -> Json<Value> {
    let outcome = state.scheduler.start_talking().await;
    Json(json!({
        "success": true,
        "message": "Duck talk animation started",
        "outcome": outcome.as_str(),
    }))
}

pub async fn talk_stop(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stopped = state.scheduler.stop_talking();
    Json(json!({
        "success": true,
        "message": "Duck talk animation stopped",
        "wasTalking": stopped,
    }))
}

/// Any gesture token, `greet` or `goodluck`. Fire and forget.
pub async fn gesture(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let action = Action::from_name(&name, state.scheduler.routines())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("Unknown gesture: {}", name)))?;
    drop(state.scheduler.fire_once(action));
    Ok(Json(json!({
        "success": true,
        "message": format!("Gesture '{}' triggered", name.to_lowercase()),
    })))
}
