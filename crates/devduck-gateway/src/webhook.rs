//! `POST /webhook/vapi` - the voice-AI service's event feed.

use crate::functions::{self, ProjectSnapshot};
use crate::state::AppState;
use axum::{extract::State, Json};
use devduck_hardware::{EventKind, NormalizedEvent};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub async fn vapi_webhook(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Json<Value> {
    let message = body.get("message").cloned().unwrap_or_else(|| json!({}));
    let event = NormalizedEvent::from_message(&message);
    info!(
        target: "devduck::webhook",
        event = %event.raw_type,
        kind = event.kind.as_str(),
        "received webhook"
    );

    match event.kind {
        EventKind::FunctionCall => handle_function_call(&state, &event).await,
        kind if kind.is_lifecycle() => {
            state
                .record(json!({
                    "type": "conversation_event",
                    "event": event.raw_type,
                    "message": message,
                }))
                .await;
            // Motion runs detached; the response does not wait for it.
            let reaction = state.reactor.react(&event).await;
            debug!(target: "devduck::webhook", reaction = reaction.label(), "duck reacted");
            Json(json!({
                "success": true,
                "message": format!("Event {} logged", event.raw_type),
            }))
        }
        _ => {
            state.reactor.react(&event).await;
            Json(json!({"success": true, "message": "Webhook received"}))
        }
    }
}

async fn handle_function_call(state: &AppState, event: &NormalizedEvent) -> Json<Value> {
    let call = event.function_call().unwrap_or_default();
    let snapshot = ProjectSnapshot {
        listening: state.is_listening(),
        conversation_count: state.history_len().await,
    };

    let Some(result) = functions::dispatch(&call.name, &call.parameters, snapshot) else {
        warn!(target: "devduck::webhook", function = %call.name, "unknown function");
        return Json(json!({
            "result": format!("Unknown function: {}", call.name),
            "success": false,
        }));
    };

    state.reactor.react(event).await;
    state
        .record(json!({
            "type": "function_call",
            "function": call.name,
            "parameters": call.parameters,
            "result": result,
        }))
        .await;

    Json(json!({
        "result": result.get("result").cloned().unwrap_or_else(|| json!("Function executed successfully")),
        "success": result.get("success").cloned().unwrap_or(json!(true)),
        "data": result,
    }))
}
