//! Room transport for the bot participant.
//!
//! [`RoomTransport`] owns the bot's side of a LiveKit room: the inbound
//! frame queue that feeds the pipeline, the outbound channel that carries
//! audio and app messages back to the room, participant bookkeeping and
//! the event handlers interested in it. Its [`input`](RoomTransport::input)
//! and [`output`](RoomTransport::output) stages sit at either end of the
//! pipeline.

use crate::error::VoiceError;
use crate::frame::{AudioChunk, Frame};
use crate::processor::FrameProcessor;
use crate::vad::{VadAnalyzer, VadEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use wzrd_types::voice::{Participant, TransportParams, VideoSource};

/// Capacity of the inbound frame queue.
const INBOUND_QUEUE_CAPACITY: usize = 256;

/// Capacity of the outbound broadcast channel.
const OUTBOUND_BROADCAST_CAPACITY: usize = 256;

/// Something the bot sends to the room.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Bot speech.
    Audio(AudioChunk),
    /// A JSON app message on the room's data channel.
    App(serde_json::Value),
}

/// Connection state of the bot in its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Initialized,
    Joining,
    Joined,
    Leaving,
    Left,
    Error,
}

impl CallState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Joining => "joining",
            Self::Joined => "joined",
            Self::Leaving => "leaving",
            Self::Left => "left",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The first remote participant arrived. Fired once per transport,
    /// after the matching `ParticipantJoined`.
    FirstParticipantJoined(Participant),
    ParticipantJoined(Participant),
    ParticipantLeft {
        participant: Participant,
        reason: String,
    },
    CallStateUpdated(CallState),
}

#[async_trait]
pub trait TransportEventHandler: Send + Sync {
    async fn on_event(
        &self,
        transport: &RoomTransport,
        event: &TransportEvent,
    ) -> Result<(), VoiceError>;
}

/// An active video subscription on a remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCapture {
    pub participant_id: String,
    pub framerate: u32,
    pub source: VideoSource,
}

pub struct RoomTransport {
    room_url: String,
    token: String,
    bot_name: String,
    params: TransportParams,
    inbound_tx: mpsc::Sender<Frame>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Frame>>>,
    outbound_tx: broadcast::Sender<OutboundMessage>,
    handlers: RwLock<Vec<Arc<dyn TransportEventHandler>>>,
    participants: Mutex<HashMap<String, Participant>>,
    first_joined: AtomicBool,
    captures: Mutex<Vec<VideoCapture>>,
}

impl std::fmt::Debug for RoomTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomTransport")
            .field("room_url", &self.room_url)
            .field("token_len", &self.token.len())
            .field("bot_name", &self.bot_name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl RoomTransport {
    pub fn new(
        room_url: impl Into<String>,
        token: impl Into<String>,
        bot_name: impl Into<String>,
        params: TransportParams,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        let (outbound_tx, _) = broadcast::channel(OUTBOUND_BROADCAST_CAPACITY);

        Self {
            room_url: room_url.into(),
            token: token.into(),
            bot_name: bot_name.into(),
            params,
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            outbound_tx,
            handlers: RwLock::new(Vec::new()),
            participants: Mutex::new(HashMap::new()),
            first_joined: AtomicBool::new(false),
            captures: Mutex::new(Vec::new()),
        }
    }

    pub fn room_url(&self) -> &str {
        &self.room_url
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    pub fn params(&self) -> &TransportParams {
        &self.params
    }

    /// The stage that turns room input into pipeline frames.
    pub fn input(&self) -> TransportInput {
        TransportInput {
            vad: self
                .params
                .vad_enabled
                .then(|| VadAnalyzer::new(self.params.vad)),
            passthrough: self.params.vad_audio_passthrough,
        }
    }

    /// The stage that hands bot audio to the room.
    pub fn output(&self) -> TransportOutput {
        TransportOutput {
            outbound: self.outbound_tx.clone(),
            audio_enabled: self.params.audio_out_enabled,
        }
    }

    /// Queue for frames arriving from the room.
    pub fn sender(&self) -> mpsc::Sender<Frame> {
        self.inbound_tx.clone()
    }

    /// Takes the inbound queue. Only the first call gets it.
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<Frame>> {
        self.inbound_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    pub fn outbound(&self) -> broadcast::Sender<OutboundMessage> {
        self.outbound_tx.clone()
    }

    pub fn subscribe_output(&self) -> broadcast::Receiver<OutboundMessage> {
        self.outbound_tx.subscribe()
    }

    pub fn register_handler(&self, handler: Arc<dyn TransportEventHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(handler);
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.participants
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub async fn participant_joined(&self, participant: Participant) -> Result<(), VoiceError> {
        info!(participant_id = %participant.id, "participant joined");
        self.participants
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(participant.id.clone(), participant.clone());

        let first = !self.first_joined.swap(true, Ordering::SeqCst);
        self.dispatch(&TransportEvent::ParticipantJoined(participant.clone()))
            .await?;
        if first {
            self.dispatch(&TransportEvent::FirstParticipantJoined(participant))
                .await?;
        }
        Ok(())
    }

    pub async fn participant_left(
        &self,
        participant: Participant,
        reason: &str,
    ) -> Result<(), VoiceError> {
        info!(participant_id = %participant.id, reason, "participant left");
        self.participants
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&participant.id);

        self.dispatch(&TransportEvent::ParticipantLeft {
            participant,
            reason: reason.to_string(),
        })
        .await
    }

    pub async fn call_state_updated(&self, state: CallState) -> Result<(), VoiceError> {
        debug!(state = state.as_str(), "call state updated");
        self.dispatch(&TransportEvent::CallStateUpdated(state)).await
    }

    /// Subscribes to one of a participant's video feeds.
    pub fn capture_participant_video(
        &self,
        participant_id: &str,
        framerate: u32,
        source: VideoSource,
    ) -> Result<(), VoiceError> {
        let known = self
            .participants
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(participant_id);
        if !known {
            return Err(VoiceError::Transport(format!(
                "cannot capture video of unknown participant {participant_id}"
            )));
        }

        info!(
            participant_id,
            framerate,
            source = source.as_str(),
            "capturing participant video"
        );
        let mut captures = self.captures.lock().unwrap_or_else(|e| e.into_inner());
        captures.retain(|c| !(c.participant_id == participant_id && c.source == source));
        captures.push(VideoCapture {
            participant_id: participant_id.to_string(),
            framerate,
            source,
        });
        Ok(())
    }

    pub fn captures(&self) -> Vec<VideoCapture> {
        self.captures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn dispatch(&self, event: &TransportEvent) -> Result<(), VoiceError> {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for handler in handlers {
            handler.on_event(self, event).await?;
        }
        Ok(())
    }
}

/// First pipeline stage. Runs VAD over input audio and emits turn frames.
#[derive(Debug)]
pub struct TransportInput {
    vad: Option<VadAnalyzer>,
    passthrough: bool,
}

#[async_trait]
impl FrameProcessor for TransportInput {
    fn name(&self) -> &'static str {
        "transport.input"
    }

    async fn process(&mut self, frame: Frame) -> Result<Vec<Frame>, VoiceError> {
        let Frame::InputAudio(chunk) = frame else {
            return Ok(vec![frame]);
        };

        let Some(vad) = self.vad.as_mut() else {
            return Ok(vec![Frame::InputAudio(chunk)]);
        };

        let mut out = Vec::with_capacity(2);
        match vad.analyze(&chunk) {
            Some(VadEvent::SpeechStarted) => out.push(Frame::UserStartedSpeaking),
            Some(VadEvent::SpeechStopped) => out.push(Frame::UserStoppedSpeaking),
            None => {}
        }
        if self.passthrough {
            out.push(Frame::InputAudio(chunk));
        }
        Ok(out)
    }
}

/// Sends bot audio to the room. Other frames pass through.
#[derive(Debug)]
pub struct TransportOutput {
    outbound: broadcast::Sender<OutboundMessage>,
    audio_enabled: bool,
}

#[async_trait]
impl FrameProcessor for TransportOutput {
    fn name(&self) -> &'static str {
        "transport.output"
    }

    async fn process(&mut self, frame: Frame) -> Result<Vec<Frame>, VoiceError> {
        match frame {
            Frame::OutputAudio(chunk) => {
                if !self.audio_enabled {
                    warn!("dropping bot audio, audio output disabled");
                } else if self.outbound.send(OutboundMessage::Audio(chunk)).is_err() {
                    debug!("no room listeners for bot audio");
                }
                Ok(Vec::new())
            }
            other => Ok(vec![other]),
        }
    }
}
