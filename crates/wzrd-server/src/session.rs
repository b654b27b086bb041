//! Running bot sessions.

use crate::AppState;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use wzrd_types::voice::Participant;
use wzrd_voice::{BotCallbacks, BotPipeline, CallState, Frame, RoomTransport, VoiceError};

/// Handle to a bot session running in the background.
#[derive(Debug, Clone)]
pub struct BotSession {
    pub room_name: String,
    pub transport: Arc<RoomTransport>,
    sender: mpsc::Sender<Frame>,
    done: watch::Receiver<bool>,
}

impl BotSession {
    /// Queues a frame as if it arrived from the room.
    pub async fn send(&self, frame: Frame) -> Result<(), VoiceError> {
        self.sender
            .send(frame)
            .await
            .map_err(|_| VoiceError::Transport("session has already ended".to_string()))
    }

    /// Ends the session and waits until its pipeline has shut down, so
    /// every pending message has been stored.
    pub async fn end(mut self) {
        if self.sender.send(Frame::End).await.is_err() {
            warn!(room = %self.room_name, "session pipeline already gone");
        }
        // An Err here means the session task is gone; nothing left to wait on.
        let _ = self.done.wait_for(|done| *done).await;
    }
}

/// Registers a session and runs its pipeline in the background. The
/// session removes itself and its room once the pipeline stops.
pub fn spawn_session(state: &AppState, session_id: String, room_name: String, bot: BotPipeline) {
    let (done_tx, done_rx) = watch::channel(false);
    let transport = bot.transport().clone();

    state
        .sessions
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .insert(
            session_id.clone(),
            BotSession {
                room_name: room_name.clone(),
                sender: transport.sender(),
                transport,
                done: done_rx,
            },
        );

    let sessions = state.sessions.clone();
    let rooms = state.rooms.clone();
    tokio::spawn(async move {
        match bot.run().await {
            Ok(()) => info!(session_id = %session_id, "bot session finished"),
            // The message store already logged the failing write.
            Err(VoiceError::Storage(_)) => {
                warn!(session_id = %session_id, "bot session aborted after a storage failure")
            }
            Err(e) => warn!(session_id = %session_id, error = %e, "bot session aborted"),
        }

        sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&session_id);

        if rooms.is_enabled() {
            if let Err(e) = rooms.delete_room(&room_name).await {
                warn!(room = %room_name, error = %e, "failed to delete room");
            }
        }

        let _ = done_tx.send(true);
    });
}

/// Logs room lifecycle events for one session.
#[derive(Debug)]
pub struct SessionCallbacks {
    pub session_id: String,
}

#[async_trait]
impl BotCallbacks for SessionCallbacks {
    async fn on_first_participant_joined(
        &self,
        _transport: &RoomTransport,
        participant: &Participant,
    ) -> Result<(), VoiceError> {
        info!(
            session_id = %self.session_id,
            participant_id = %participant.id,
            "first participant joined"
        );
        Ok(())
    }

    async fn on_participant_joined(
        &self,
        _transport: &RoomTransport,
        participant: &Participant,
    ) -> Result<(), VoiceError> {
        info!(
            session_id = %self.session_id,
            participant_id = %participant.id,
            name = participant.name.as_deref().unwrap_or(""),
            "participant joined"
        );
        Ok(())
    }

    async fn on_participant_left(
        &self,
        _transport: &RoomTransport,
        participant: &Participant,
        reason: &str,
    ) -> Result<(), VoiceError> {
        info!(
            session_id = %self.session_id,
            participant_id = %participant.id,
            reason,
            "participant left"
        );
        Ok(())
    }

    async fn on_call_state_updated(
        &self,
        _transport: &RoomTransport,
        state: CallState,
    ) -> Result<(), VoiceError> {
        info!(session_id = %self.session_id, state = state.as_str(), "call state updated");
        Ok(())
    }
}
