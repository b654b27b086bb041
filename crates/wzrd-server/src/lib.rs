//! WZRD server library logic.
//!
//! Hosts voice bot sessions for digital-twin conversations over HTTP.

pub mod api;
pub mod config;
pub mod session;
pub mod webhook;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use config::Config;
use serde_json::{json, Value};
use session::BotSession;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use wzrd_db::DbPool;
use wzrd_voice::{BotConfig, LlmBackend, RoomService};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    pub config: Arc<Config>,
    /// Settings applied to every bot session.
    pub bot_config: Arc<BotConfig>,
    /// LiveKit room management.
    pub rooms: Arc<RoomService>,
    /// Model backend shared by all sessions.
    pub llm: Arc<dyn LlmBackend>,
    /// Running bot sessions by session ID.
    ///
    /// Uses `std::sync::RwLock`: every acquisition is a brief map operation
    /// that never spans an `.await`.
    pub sessions: Arc<RwLock<HashMap<String, BotSession>>>,
}

impl AppState {
    pub fn new(pool: DbPool, config: Config, llm: Arc<dyn LlmBackend>) -> Self {
        Self {
            pool,
            bot_config: Arc::new(config.bot_config()),
            rooms: Arc::new(RoomService::new(config.livekit.clone())),
            config: Arc::new(config),
            llm,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// Maximum request body size (1 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/bots", post(api::start_bot_handler))
        .route("/api/bots/{sessionId}", delete(api::stop_bot_handler))
        .route(
            "/api/bots/{sessionId}/messages",
            post(api::client_message_handler),
        )
        .route(
            "/api/conversations/{conversationId}/context",
            get(api::conversation_context_handler),
        )
        .route("/webhooks/livekit", post(webhook::livekit_webhook_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
