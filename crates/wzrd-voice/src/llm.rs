//! The multimodal LLM stage.

use crate::aggregator::SharedContext;
use crate::config::GeminiConfig;
use crate::error::VoiceError;
use crate::frame::{AudioChunk, Frame};
use crate::processor::FrameProcessor;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use wzrd_types::voice::GeminiVoice;
use wzrd_types::{ChatMessage, Tools};

/// Identity attached to transcriptions of the room's human speaker.
pub const USER_TRANSCRIPTION_ID: &str = "user";

/// Snapshot of the context sent for one response.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Tools,
    pub voice: GeminiVoice,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LlmReply {
    pub text: String,
    /// Synthesized speech, when the backend produces it.
    pub audio: Option<AudioChunk>,
}

/// A model that can answer a conversation and, optionally, transcribe
/// the user's audio.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(&self, request: LlmRequest) -> Result<LlmReply, VoiceError>;

    /// Returns `None` when the backend does not transcribe.
    async fn transcribe(&self, _audio: &AudioChunk) -> Result<Option<String>, VoiceError> {
        Ok(None)
    }
}

/// Pipeline stage that turns `LlmRun` requests into bot responses.
///
/// Each response is emitted as a bracketed frame sequence: LLM start, TTS
/// start, optional speech, the text, the bot transcript, TTS stop and LLM
/// end. Backend failures are reported downstream as `Frame::Error` and do
/// not stop the pipeline.
pub struct MultimodalLlmService {
    backend: Arc<dyn LlmBackend>,
    config: GeminiConfig,
    context: Option<SharedContext>,
    user_speaking: bool,
    user_audio: Option<AudioChunk>,
}

impl std::fmt::Debug for MultimodalLlmService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultimodalLlmService")
            .field("config", &self.config)
            .field("has_context", &self.context.is_some())
            .finish_non_exhaustive()
    }
}

impl MultimodalLlmService {
    pub fn new(backend: Arc<dyn LlmBackend>, config: GeminiConfig) -> Self {
        Self {
            backend,
            config,
            context: None,
            user_speaking: false,
            user_audio: None,
        }
    }

    pub fn set_context(&mut self, context: SharedContext) {
        self.context = Some(context);
    }

    async fn respond(&mut self) -> Vec<Frame> {
        let Some(context) = self.context.as_ref() else {
            warn!("LLM run requested before a context was set");
            return Vec::new();
        };

        let request = {
            let context = context.lock().unwrap_or_else(|e| e.into_inner());
            LlmRequest {
                messages: context.messages().to_vec(),
                tools: context.tools().clone(),
                voice: self.config.voice_id,
            }
        };
        debug!(messages = request.messages.len(), "running inference");

        let reply = match self.backend.generate(request).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, "inference failed");
                return vec![Frame::Error(e.to_string())];
            }
        };

        let mut frames = vec![Frame::LlmResponseStart, Frame::TtsStarted];
        let spoke = reply.audio.is_some();
        if let Some(audio) = reply.audio {
            frames.push(Frame::BotStartedSpeaking);
            frames.push(Frame::OutputAudio(audio));
        }
        frames.push(Frame::LlmText(reply.text.clone()));
        frames.push(Frame::TtsText(reply.text.clone()));
        if self.config.transcribe_model_audio {
            frames.push(Frame::BotTranscription(reply.text));
        }
        if spoke {
            frames.push(Frame::BotStoppedSpeaking);
        }
        frames.push(Frame::TtsStopped);
        frames.push(Frame::LlmResponseEnd);
        frames
    }

    /// Transcribes the audio buffered during the last user turn, adds it to
    /// the context and responds to it.
    async fn finish_user_turn(&mut self) -> Vec<Frame> {
        let Some(audio) = self.user_audio.take() else {
            return Vec::new();
        };

        let text = match self.backend.transcribe(&audio).await {
            Ok(Some(text)) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => return Vec::new(),
            Err(e) => {
                error!(error = %e, "user audio transcription failed");
                return vec![Frame::Error(e.to_string())];
            }
        };

        info!(chars = text.len(), "transcribed user turn");
        if let Some(context) = self.context.as_ref() {
            context
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .add_message(ChatMessage::user(text.clone()));
        }

        let mut frames = vec![Frame::Transcription {
            text,
            user_id: USER_TRANSCRIPTION_ID.to_string(),
            is_final: true,
        }];
        frames.extend(self.respond().await);
        frames
    }
}

#[async_trait]
impl FrameProcessor for MultimodalLlmService {
    fn name(&self) -> &'static str {
        "gemini_live"
    }

    async fn process(&mut self, frame: Frame) -> Result<Vec<Frame>, VoiceError> {
        match frame {
            Frame::Start => {
                let mut frames = vec![Frame::Start];
                if self.config.inference_on_context_initialization {
                    frames.extend(self.respond().await);
                }
                Ok(frames)
            }
            Frame::LlmRun => Ok(self.respond().await),
            Frame::UserStartedSpeaking => {
                self.user_speaking = true;
                self.user_audio = None;
                Ok(vec![frame])
            }
            Frame::UserStoppedSpeaking => {
                self.user_speaking = false;
                let mut frames = vec![frame];
                if self.config.transcribe_user_audio {
                    frames.extend(self.finish_user_turn().await);
                }
                Ok(frames)
            }
            Frame::InputAudio(chunk) => {
                if self.config.transcribe_user_audio && self.user_speaking {
                    match self.user_audio.as_mut() {
                        Some(buffer) => buffer.append(&chunk),
                        None => self.user_audio = Some(chunk),
                    }
                }
                Ok(Vec::new())
            }
            other => Ok(vec![other]),
        }
    }
}
