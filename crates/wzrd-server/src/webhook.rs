//! LiveKit webhook intake.
//!
//! LiveKit reports room activity by POSTing signed events. Participant
//! joins and departures are forwarded to the matching session's transport;
//! a finished room ends its session.

use crate::api::ApiError;
use crate::session::BotSession;
use crate::AppState;
use axum::{
    extract::Extension,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
};
use livekit_api::access_token::TokenVerifier;
use livekit_api::webhooks::WebhookReceiver;
use livekit_protocol::{ParticipantInfo, WebhookEvent};
use std::sync::Arc;
use tracing::{debug, warn};
use wzrd_types::voice::Participant;
use wzrd_voice::Frame;

/// Identity prefix of the bot participants this server mints tokens for.
const BOT_IDENTITY_PREFIX: &str = "bot-";

/// Reason reported when LiveKit says a participant left.
const LEFT_CALL_REASON: &str = "leftCall";

/// Handler for `POST /webhooks/livekit`.
pub async fn livekit_webhook_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ApiError> {
    if !state.rooms.is_enabled() {
        return Err(ApiError::ServiceUnavailable(
            "LiveKit is not configured".to_string(),
        ));
    }

    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing authorization header".to_string()))?;

    let receiver = WebhookReceiver::new(TokenVerifier::with_api_key(
        &state.config.livekit.api_key,
        &state.config.livekit.api_secret,
    ));
    let event = receiver
        .receive(&body, auth)
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    apply_room_event(&state, &event).await;
    Ok(StatusCode::OK)
}

fn participant_from_info(info: &ParticipantInfo) -> Participant {
    Participant {
        id: info.identity.clone(),
        name: (!info.name.is_empty()).then(|| info.name.clone()),
    }
}

fn find_session(state: &AppState, room_name: &str) -> Option<BotSession> {
    state
        .sessions
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .values()
        .find(|s| s.room_name == room_name)
        .cloned()
}

/// Routes one room event to its session. Returns whether a session acted
/// on it.
pub async fn apply_room_event(state: &AppState, event: &WebhookEvent) -> bool {
    let Some(room_name) = event.room.as_ref().map(|r| r.name.as_str()) else {
        return false;
    };
    let Some(session) = find_session(state, room_name) else {
        debug!(room = room_name, event = %event.event, "webhook for unknown room");
        return false;
    };

    let participant = event
        .participant
        .as_ref()
        .filter(|p| !p.identity.starts_with(BOT_IDENTITY_PREFIX))
        .map(participant_from_info);

    let result = match (event.event.as_str(), participant) {
        ("participant_joined", Some(participant)) => {
            session.transport.participant_joined(participant).await
        }
        ("participant_left", Some(participant)) => {
            session
                .transport
                .participant_left(participant, LEFT_CALL_REASON)
                .await
        }
        ("room_finished", _) => session.send(Frame::End).await,
        _ => return false,
    };

    if let Err(e) = result {
        warn!(room = room_name, event = %event.event, error = %e, "failed to apply room event");
    }
    true
}
