//! DevDuck Gateway - HTTP front end for the duck.
//! The voice-AI service posts webhook events here; the duck moves.

mod context;
mod duck;
mod functions;
mod state;
mod webhook;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use devduck_hardware::{AnimationScheduler, DuckConfig};
use serde_json::{json, Value};
use state::{now_rfc3339, AppState};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_BIND: &str = "0.0.0.0:8001";

const ENDPOINTS: [&str; 12] = [
    "/listening/toggle",
    "/history",
    "/history/clear",
    "/status",
    "/health",
    "/webhook/vapi",
    "/duck/talk/start",
    "/duck/talk/stop",
    "/duck/gesture/{name}",
    "/get_code_snippet",
    "/store_context",
    "/retrieve_context",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = dotenv {
        tracing::debug!(".env not loaded: {} (using system environment)", e);
    }

    let config = DuckConfig::load().unwrap_or_else(|e| {
        tracing::warn!("{}; falling back to default duck configuration", e);
        DuckConfig::default()
    });
    let scheduler = Arc::new(AnimationScheduler::from_config(&config)?);
    let state = Arc::new(AppState::new(Arc::clone(&scheduler)));
    let app = build_app(state);

    let addr = std::env::var("DEVDUCK_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("DevDuck gateway listening on {}", addr);

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested (Ctrl+C received)");
        }
    }

    // Stops the talk loop, drains the writer and closes the serial port.
    scheduler.shutdown().await;
    Ok(())
}

fn build_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/listening/toggle", post(toggle_listening))
        .route("/history", get(history))
        .route("/history/clear", post(clear_history))
        .route("/webhook/vapi", post(webhook::vapi_webhook))
        .route("/duck/talk/start", post(duck::talk_start))
        .route("/duck/talk/stop", post(duck::talk_stop))
        .route("/duck/gesture/:name", post(duck::gesture))
        .route("/get_code_snippet", post(context::get_code_snippet))
        .route("/store_context", post(context::store_context))
        .route("/retrieve_context", post(context::retrieve_context))
        .with_state(state)
        .layer(cors)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "DevDuck API is running",
        "endpoints": ENDPOINTS,
    }))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": "DevDuck API"}))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let channel = state.scheduler.channel();
    Json(json!({
        "isListening": state.is_listening(),
        "historyCount": state.history_len().await,
        "timestamp": now_rfc3339(),
        "hardware": channel.state().as_str(),
        "port": channel.connected_port(),
        "talking": state.scheduler.state().as_str(),
        "activeLoops": state.scheduler.active_loops(),
    }))
}

async fn toggle_listening(State(state): State<Arc<AppState>>) -> Json<Value> {
    let listening = state.toggle_listening();
    let status = if listening { "listening" } else { "stopped" };
    state.record(json!({"event": status, "type": "system"})).await;
    tracing::info!(target: "devduck::webhook", "Listening toggled to: {}", status);
    Json(json!({"isListening": listening, "status": status}))
}

async fn history(State(state): State<Arc<AppState>>) -> Json<Value> {
    let history = state.history.read().await;
    Json(json!({"history": *history, "count": history.len()}))
}

async fn clear_history(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.history.write().await.clear();
    tracing::info!(target: "devduck::webhook", "Conversation history cleared");
    Json(json!({"message": "History cleared", "count": 0}))
}
