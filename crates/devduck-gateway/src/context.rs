//! Code snippet and context-store endpoints. Each takes a function-call shaped
//! body: `{name, parameters}`.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Deserialize)]
pub struct FunctionCallRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

type ApiResult = Result<Json<Value>, (StatusCode, String)>;

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Number(_)) => true,
    }
}

fn snippet_id(params: &Map<String, Value>) -> Option<String> {
    match params.get("snippet_id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub async fn get_code_snippet(Json(request): Json<FunctionCallRequest>) -> ApiResult {
    debug!(target: "devduck::webhook", function = %request.name, "code snippet requested");
    let path = request
        .parameters
        .get("file_path")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "File path is required".to_string()))?;

    match tokio::fs::read_to_string(path).await {
        Ok(code_snippet) => Ok(Json(json!({"success": true, "code_snippet": code_snippet}))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err((StatusCode::NOT_FOUND, "File not found".to_string()))
        }
        Err(e) => {
            error!(target: "devduck::webhook", path, error = %e, "error reading file");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string()))
        }
    }
}

pub async fn store_context(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FunctionCallRequest>,
) -> ApiResult {
    let context = request.parameters.get("context");
    let id = snippet_id(&request.parameters)
        .filter(|_| is_present(context))
        .ok_or((
            StatusCode::BAD_REQUEST,
            "Snippet ID and context are required".to_string(),
        ))?;
    let context = context.cloned().unwrap_or(Value::Null);
    state.contexts.insert(id, context);
    Ok(Json(json!({"success": true, "message": "Context stored successfully"})))
}

pub async fn retrieve_context(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FunctionCallRequest>,
) -> ApiResult {
    let id = snippet_id(&request.parameters)
        .ok_or((StatusCode::BAD_REQUEST, "Snippet ID is required".to_string()))?;
    let context = state
        .contexts
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or((StatusCode::NOT_FOUND, "Context not found".to_string()))?;
    Ok(Json(json!({"success": true, "context": context})))
}
