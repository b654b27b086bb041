//! Context aggregators: fold conversation turns into the shared LLM context.

use crate::error::VoiceError;
use crate::frame::Frame;
use crate::processor::FrameProcessor;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::debug;
use wzrd_context::LlmContext;
use wzrd_types::ChatMessage;

/// LLM context shared between the stages of one pipeline.
pub type SharedContext = Arc<Mutex<LlmContext>>;

pub fn shared_context(context: LlmContext) -> SharedContext {
    Arc::new(Mutex::new(context))
}

/// The user and assistant aggregators for one context.
#[derive(Debug)]
pub struct ContextAggregatorPair {
    pub user: UserContextAggregator,
    pub assistant: AssistantContextAggregator,
}

impl ContextAggregatorPair {
    pub fn split(self) -> (UserContextAggregator, AssistantContextAggregator) {
        (self.user, self.assistant)
    }
}

pub fn create_context_aggregator(context: &SharedContext) -> ContextAggregatorPair {
    ContextAggregatorPair {
        user: UserContextAggregator {
            context: context.clone(),
            user_speaking: false,
            pending: Vec::new(),
        },
        assistant: AssistantContextAggregator {
            context: context.clone(),
            in_response: false,
            pending: String::new(),
        },
    }
}

/// Collects final user transcriptions into one user message per turn and
/// asks the LLM to respond.
///
/// While the user is still speaking, transcriptions are held until the turn
/// ends. A transcription that arrives outside a turn is committed at once.
#[derive(Debug)]
pub struct UserContextAggregator {
    context: SharedContext,
    user_speaking: bool,
    pending: Vec<String>,
}

impl UserContextAggregator {
    fn flush(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let text = self.pending.join(" ");
        self.pending.clear();

        debug!(chars = text.len(), "adding user turn to context");
        self.context
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .add_message(ChatMessage::user(text));
        true
    }
}

#[async_trait]
impl FrameProcessor for UserContextAggregator {
    fn name(&self) -> &'static str {
        "user_aggregator"
    }

    async fn process(&mut self, frame: Frame) -> Result<Vec<Frame>, VoiceError> {
        match frame {
            Frame::UserStartedSpeaking => {
                self.user_speaking = true;
                Ok(vec![frame])
            }
            Frame::UserStoppedSpeaking => {
                self.user_speaking = false;
                if self.flush() {
                    Ok(vec![frame, Frame::LlmRun])
                } else {
                    Ok(vec![frame])
                }
            }
            Frame::Transcription {
                ref text,
                is_final: true,
                ..
            } => {
                let text = text.trim();
                if !text.is_empty() {
                    self.pending.push(text.to_string());
                }
                if !self.user_speaking && self.flush() {
                    Ok(vec![frame, Frame::LlmRun])
                } else {
                    Ok(vec![frame])
                }
            }
            other => Ok(vec![other]),
        }
    }
}

/// Collects streamed LLM text into one assistant message per response.
#[derive(Debug)]
pub struct AssistantContextAggregator {
    context: SharedContext,
    in_response: bool,
    pending: String,
}

#[async_trait]
impl FrameProcessor for AssistantContextAggregator {
    fn name(&self) -> &'static str {
        "assistant_aggregator"
    }

    async fn process(&mut self, frame: Frame) -> Result<Vec<Frame>, VoiceError> {
        match &frame {
            Frame::LlmResponseStart => {
                self.in_response = true;
                self.pending.clear();
            }
            Frame::LlmText(text) if self.in_response => self.pending.push_str(text),
            Frame::LlmResponseEnd => {
                self.in_response = false;
                let text = std::mem::take(&mut self.pending);
                if !text.trim().is_empty() {
                    debug!(chars = text.len(), "adding assistant turn to context");
                    self.context
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .add_message(ChatMessage::assistant(text));
                }
            }
            _ => {}
        }
        Ok(vec![frame])
    }
}
