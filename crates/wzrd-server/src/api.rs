//! API handlers for the WZRD server.

use crate::session::{spawn_session, SessionCallbacks};
use crate::AppState;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use wzrd_context::{initialize_chat_context, ContextError};
use wzrd_types::{ChatMessage, Tools, TwinRecord};
use wzrd_voice::rtvi::RtviAction;
use wzrd_voice::{bot_pipeline, BotParams, Frame, RtviClientMessage, VoiceError};

/// Request body for starting a bot session.
#[derive(Debug, Deserialize)]
pub struct StartBotRequest {
    pub conversation_id: String,
    #[serde(default)]
    pub twin_id: Option<String>,
    /// Client actions replayed once the client is ready.
    #[serde(default)]
    pub actions: Vec<RtviAction>,
}

/// Response body for a started bot session.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartBotResponse {
    pub session_id: String,
    pub room_name: String,
    /// Room URL for the client. Empty when LiveKit is not configured.
    pub room_url: String,
    /// Join token for the human participant. Empty when LiveKit is not
    /// configured.
    pub token: String,
}

/// Response body for a context preview.
#[derive(Debug, Serialize, Deserialize)]
pub struct ContextResponse {
    pub conversation_id: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Tools,
    pub twin: Option<TwinRecord>,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("upstream error: {0}")]
    BadGateway(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<ContextError> for ApiError {
    fn from(e: ContextError) -> Self {
        match e {
            ContextError::ConversationNotFound(id) => {
                ApiError::NotFound(format!("conversation {id}"))
            }
            other => ApiError::InternalServerError(other.to_string()),
        }
    }
}

impl From<VoiceError> for ApiError {
    fn from(e: VoiceError) -> Self {
        match e {
            VoiceError::Context(e) => e.into(),
            VoiceError::RoomService(msg) => ApiError::BadGateway(msg),
            other => ApiError::InternalServerError(other.to_string()),
        }
    }
}

/// Handler for `POST /api/bots`.
///
/// Creates a room, assembles a bot for the conversation and starts it in
/// the background. Without LiveKit credentials the bot still runs, but no
/// room is created and the returned URL and token are empty.
pub async fn start_bot_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<StartBotRequest>,
) -> Result<(StatusCode, Json<StartBotResponse>), ApiError> {
    if payload.conversation_id.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "conversation_id must not be empty".to_string(),
        ));
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let room_name = format!("wzrd-{session_id}");

    let (room_url, bot_token, user_token) = if state.rooms.is_enabled() {
        state.rooms.create_room(&room_name).await?;
        let bot_token = state.rooms.bot_token(
            &room_name,
            &format!("bot-{session_id}"),
            &state.bot_config.bot_name,
        )?;
        let user_token =
            state
                .rooms
                .user_token(&room_name, &format!("user-{session_id}"), "User")?;
        (state.rooms.url().to_string(), bot_token, user_token)
    } else {
        tracing::warn!("LiveKit is not configured, starting bot without a room");
        (String::new(), String::new(), String::new())
    };

    let params = BotParams {
        conversation_id: payload.conversation_id,
        twin_id: payload.twin_id,
        actions: payload.actions,
    };

    let bot = match bot_pipeline(
        &params,
        &state.bot_config,
        Arc::new(SessionCallbacks {
            session_id: session_id.clone(),
        }),
        &room_url,
        &bot_token,
        state.pool.clone(),
        state.llm.clone(),
    )
    .await
    {
        Ok(bot) => bot,
        Err(e) => {
            if state.rooms.is_enabled() {
                if let Err(e) = state.rooms.delete_room(&room_name).await {
                    tracing::warn!(room = %room_name, error = %e, "failed to delete unused room");
                }
            }
            return Err(e.into());
        }
    };

    tracing::info!(
        session_id = %session_id,
        conversation_id = %params.conversation_id,
        room = %room_name,
        "starting bot session"
    );
    spawn_session(&state, session_id.clone(), room_name.clone(), bot);

    Ok((
        StatusCode::CREATED,
        Json(StartBotResponse {
            session_id,
            room_name,
            room_url,
            token: user_token,
        }),
    ))
}

/// Handler for `DELETE /api/bots/{sessionId}`.
///
/// Responds once the session's pipeline has stopped and its messages are
/// stored.
pub async fn stop_bot_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state
        .sessions
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&session_id)
        .ok_or_else(|| ApiError::NotFound(format!("session {session_id}")))?;

    tracing::info!(session_id = %session_id, "stopping bot session");
    session.end().await;

    Ok(Json(serde_json::json!({
        "session_id": session_id,
        "status": "ended"
    })))
}

/// Handler for `POST /api/bots/{sessionId}/messages`.
///
/// Delivers an RTVI client message to the session as if it arrived over
/// the room's data channel.
pub async fn client_message_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(message): Json<RtviClientMessage>,
) -> Result<StatusCode, ApiError> {
    let session = state
        .sessions
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(&session_id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("session {session_id}")))?;

    session
        .send(Frame::ClientMessage(message))
        .await
        .map_err(|_| ApiError::NotFound(format!("session {session_id}")))?;

    Ok(StatusCode::ACCEPTED)
}

/// Handler for `GET /api/conversations/{conversationId}/context`.
///
/// Returns the context a bot for this conversation would start from.
pub async fn conversation_context_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ContextResponse>, ApiError> {
    let initialized = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        let id = conversation_id.clone();
        let tools = state.bot_config.tools.clone();
        let fallback = state.bot_config.fallback_prompt.clone();
        move || {
            let conn = pool
                .get()
                .map_err(|e| ApiError::InternalServerError(e.to_string()))?;
            initialize_chat_context(&conn, &id, None, tools, &fallback).map_err(ApiError::from)
        }
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {e}")))??;

    Ok(Json(ContextResponse {
        conversation_id,
        messages: initialized.context.messages().to_vec(),
        tools: initialized.context.tools().clone(),
        twin: initialized.twin,
    }))
}
