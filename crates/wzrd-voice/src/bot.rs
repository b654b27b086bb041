//! Bot session assembly.
//!
//! [`bot_pipeline`] wires one conversation into a runnable pipeline: it
//! loads the conversation's context, attaches persistence and the client
//! event protocol, and subscribes the session callbacks to room events.

use crate::aggregator::{create_context_aggregator, shared_context, SharedContext};
use crate::config::GeminiConfig;
use crate::error::VoiceError;
use crate::frame::Frame;
use crate::llm::{LlmBackend, MultimodalLlmService};
use crate::pipeline::Pipeline;
use crate::processor::FrameProcessor;
use crate::rtvi::{
    ClientReadyHandler, RtviAction, RtviBotLlmProcessor, RtviBotTranscriptionProcessor,
    RtviBotTtsProcessor, RtviEvent, RtviProcessor, RtviSink, RtviSpeakingProcessor,
    RtviUserTranscriptionProcessor,
};
use crate::storage::{ContextMessageHandler, PersistentContext};
use crate::transport::{CallState, RoomTransport, TransportEvent, TransportEventHandler};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use wzrd_context::{create_messages, initialize_chat_context, DEFAULT_SYSTEM_PROMPT};
use wzrd_db::DbPool;
use wzrd_types::voice::{Participant, TransportParams, VideoSource};
use wzrd_types::{ChatMessage, Tools, TwinRecord};

pub const DEFAULT_BOT_NAME: &str = "Gemini Bot";

/// Frame rate for participant video captured when the first user joins.
const VIDEO_CAPTURE_FPS: u32 = 1;

/// Per-session inputs supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotParams {
    pub conversation_id: String,
    #[serde(default)]
    pub twin_id: Option<String>,
    /// Client actions replayed once the client reports ready.
    #[serde(default)]
    pub actions: Vec<RtviAction>,
}

/// Settings shared by every bot session.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_name: String,
    pub transport: TransportParams,
    pub llm: GeminiConfig,
    /// System prompt used when no twin persona is available.
    pub fallback_prompt: String,
    pub tools: Tools,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_name: DEFAULT_BOT_NAME.to_string(),
            transport: TransportParams::default(),
            llm: GeminiConfig::default(),
            fallback_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            tools: Tools::NotGiven,
        }
    }
}

/// Room lifecycle hooks for the code that owns a session.
#[async_trait]
pub trait BotCallbacks: Send + Sync {
    async fn on_first_participant_joined(
        &self,
        _transport: &RoomTransport,
        _participant: &Participant,
    ) -> Result<(), VoiceError> {
        Ok(())
    }

    async fn on_participant_joined(
        &self,
        _transport: &RoomTransport,
        _participant: &Participant,
    ) -> Result<(), VoiceError> {
        Ok(())
    }

    async fn on_participant_left(
        &self,
        _transport: &RoomTransport,
        _participant: &Participant,
        _reason: &str,
    ) -> Result<(), VoiceError> {
        Ok(())
    }

    async fn on_call_state_updated(
        &self,
        _transport: &RoomTransport,
        _state: CallState,
    ) -> Result<(), VoiceError> {
        Ok(())
    }
}

/// An assembled, not yet running, bot session.
pub struct BotPipeline {
    pipeline: Pipeline,
    transport: Arc<RoomTransport>,
    context: SharedContext,
    twin: Option<TwinRecord>,
}

impl std::fmt::Debug for BotPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotPipeline")
            .field("pipeline", &self.pipeline)
            .field("transport", &self.transport)
            .field("twin", &self.twin.as_ref().map(|t| &t.id))
            .finish_non_exhaustive()
    }
}

impl BotPipeline {
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.pipeline.stage_names()
    }

    pub fn transport(&self) -> &Arc<RoomTransport> {
        &self.transport
    }

    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    pub fn twin(&self) -> Option<&TwinRecord> {
        self.twin.as_ref()
    }

    /// Runs the session until the room sends `End` or its inbound queue
    /// closes.
    pub async fn run(self) -> Result<(), VoiceError> {
        let source = self
            .transport
            .take_receiver()
            .ok_or_else(|| VoiceError::Transport("pipeline is already running".to_string()))?;

        self.transport.call_state_updated(CallState::Joining).await?;
        self.transport.call_state_updated(CallState::Joined).await?;

        let result = self.pipeline.run(source).await;

        let state = if result.is_ok() {
            CallState::Left
        } else {
            CallState::Error
        };
        if let Err(e) = self.transport.call_state_updated(state).await {
            warn!(error = %e, "call state callback failed");
        }
        result
    }
}

/// Builds the pipeline for one bot session.
///
/// # Errors
///
/// Fails if the conversation does not exist or its history cannot be read.
/// A missing or unreadable twin is not an error; the fallback prompt is
/// used instead.
pub async fn bot_pipeline(
    params: &BotParams,
    config: &BotConfig,
    callbacks: Arc<dyn BotCallbacks>,
    room_url: &str,
    room_token: &str,
    pool: DbPool,
    llm: Arc<dyn LlmBackend>,
) -> Result<BotPipeline, VoiceError> {
    let transport = Arc::new(RoomTransport::new(
        room_url,
        room_token,
        config.bot_name.clone(),
        config.transport.clone(),
    ));

    let initialized = {
        let pool = pool.clone();
        let conversation_id = params.conversation_id.clone();
        let twin_id = params.twin_id.clone();
        let tools = config.tools.clone();
        let fallback = config.fallback_prompt.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| VoiceError::Database(e.to_string()))?;
            initialize_chat_context(
                &conn,
                &conversation_id,
                twin_id.as_deref(),
                tools,
                &fallback,
            )
            .map_err(VoiceError::from)
        })
        .await
        .map_err(|e| VoiceError::Database(format!("context task failed: {e}")))??
    };

    info!(
        conversation_id = %params.conversation_id,
        twin = initialized.twin.as_ref().map(|t| t.name.as_str()).unwrap_or("<none>"),
        messages = initialized.context.len(),
        "bot context initialized"
    );

    let context = shared_context(initialized.context);

    let mut llm = MultimodalLlmService::new(llm, config.llm.clone());
    llm.set_context(context.clone());

    let mut persistent = PersistentContext::new(context.clone());
    persistent.on_context_message(Arc::new(MessageStore {
        pool,
        conversation_id: params.conversation_id.clone(),
    }));

    let (user_aggregator, assistant_aggregator) = create_context_aggregator(&context).split();

    let sink = RtviSink::new(transport.outbound());
    let mut rtvi = RtviProcessor::new(sink.clone(), context.clone());
    rtvi.on_client_ready(Arc::new(ActionReplay {
        actions: params.actions.clone(),
    }));

    transport.register_handler(Arc::new(SessionEvents { callbacks }));

    let stages: Vec<Box<dyn FrameProcessor>> = vec![
        Box::new(transport.input()),
        Box::new(rtvi),
        Box::new(user_aggregator),
        Box::new(llm),
        Box::new(RtviSpeakingProcessor::new(sink.clone())),
        Box::new(RtviUserTranscriptionProcessor::new(sink.clone())),
        Box::new(RtviBotLlmProcessor::new(sink.clone())),
        Box::new(RtviBotTranscriptionProcessor::new(sink.clone())),
        Box::new(transport.output()),
        Box::new(RtviBotTtsProcessor::new(sink)),
        Box::new(assistant_aggregator),
        Box::new(persistent.create_processor(true)),
    ];

    Ok(BotPipeline {
        pipeline: Pipeline::new(stages),
        transport,
        context,
        twin: initialized.twin,
    })
}

/// Writes new context messages to the conversation's history.
struct MessageStore {
    pool: DbPool,
    conversation_id: String,
}

#[async_trait]
impl ContextMessageHandler for MessageStore {
    async fn on_context_message(&self, messages: Vec<ChatMessage>) -> Result<(), VoiceError> {
        debug!(
            conversation_id = %self.conversation_id,
            count = messages.len(),
            "storing context messages"
        );

        let pool = self.pool.clone();
        let conversation_id = self.conversation_id.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| e.to_string())?;
            create_messages(&conn, &conversation_id, &messages).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r);

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(conversation_id = %self.conversation_id, error = %e, "failed to store messages");
                Err(VoiceError::Storage(e))
            }
        }
    }
}

/// Marks the bot ready and replays the session's initial actions once the
/// client is ready.
struct ActionReplay {
    actions: Vec<RtviAction>,
}

#[async_trait]
impl ClientReadyHandler for ActionReplay {
    async fn on_client_ready(&self, rtvi: &mut RtviProcessor) -> Result<Vec<Frame>, VoiceError> {
        rtvi.set_bot_ready()?;

        let mut frames = Vec::new();
        for action in &self.actions {
            match rtvi.handle_message(action) {
                Ok(out) => frames.extend(out),
                Err(e) => {
                    warn!(error = %e, "initial action rejected");
                    rtvi.sink().event(RtviEvent::Error {
                        error: e.to_string(),
                        fatal: false,
                    })?;
                }
            }
        }
        Ok(frames)
    }
}

/// Routes room events to the session callbacks. The first participant's
/// camera and screen share are captured before the callback runs.
struct SessionEvents {
    callbacks: Arc<dyn BotCallbacks>,
}

#[async_trait]
impl TransportEventHandler for SessionEvents {
    async fn on_event(
        &self,
        transport: &RoomTransport,
        event: &TransportEvent,
    ) -> Result<(), VoiceError> {
        match event {
            TransportEvent::FirstParticipantJoined(participant) => {
                for source in [VideoSource::Camera, VideoSource::ScreenVideo] {
                    transport.capture_participant_video(&participant.id, VIDEO_CAPTURE_FPS, source)?;
                }
                self.callbacks
                    .on_first_participant_joined(transport, participant)
                    .await
            }
            TransportEvent::ParticipantJoined(participant) => {
                self.callbacks
                    .on_participant_joined(transport, participant)
                    .await
            }
            TransportEvent::ParticipantLeft {
                participant,
                reason,
            } => {
                self.callbacks
                    .on_participant_left(transport, participant, reason)
                    .await
            }
            TransportEvent::CallStateUpdated(state) => {
                self.callbacks.on_call_state_updated(transport, *state).await
            }
        }
    }
}
