//! Persistence of new context messages.

use crate::aggregator::SharedContext;
use crate::error::VoiceError;
use crate::frame::Frame;
use crate::processor::FrameProcessor;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use wzrd_types::ChatMessage;

/// Receives batches of messages appended to the context since the last
/// call.
#[async_trait]
pub trait ContextMessageHandler: Send + Sync {
    /// An error stops the pipeline.
    async fn on_context_message(&self, messages: Vec<ChatMessage>) -> Result<(), VoiceError>;
}

/// Wraps a shared context with a handler for newly added messages.
pub struct PersistentContext {
    context: SharedContext,
    handler: Option<Arc<dyn ContextMessageHandler>>,
}

impl std::fmt::Debug for PersistentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentContext")
            .field("has_handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}

impl PersistentContext {
    pub fn new(context: SharedContext) -> Self {
        Self {
            context,
            handler: None,
        }
    }

    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    pub fn on_context_message(&mut self, handler: Arc<dyn ContextMessageHandler>) {
        self.handler = Some(handler);
    }

    /// Creates the storage stage. Messages already in the context are
    /// treated as persisted.
    ///
    /// With `exit_on_endframe`, the stage flushes on `End` and ignores every
    /// frame after it.
    pub fn create_processor(&self, exit_on_endframe: bool) -> StorageProcessor {
        let persisted = self
            .context
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len();

        StorageProcessor {
            context: self.context.clone(),
            handler: self.handler.clone(),
            persisted,
            exit_on_endframe,
            finished: false,
        }
    }
}

pub struct StorageProcessor {
    context: SharedContext,
    handler: Option<Arc<dyn ContextMessageHandler>>,
    persisted: usize,
    exit_on_endframe: bool,
    finished: bool,
}

impl std::fmt::Debug for StorageProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageProcessor")
            .field("persisted", &self.persisted)
            .field("exit_on_endframe", &self.exit_on_endframe)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl StorageProcessor {
    async fn flush(&mut self) -> Result<(), VoiceError> {
        let pending: Vec<ChatMessage> = {
            let context = self.context.lock().unwrap_or_else(|e| e.into_inner());
            context
                .messages()
                .get(self.persisted..)
                .map(<[ChatMessage]>::to_vec)
                .unwrap_or_default()
        };
        if pending.is_empty() {
            return Ok(());
        }

        let count = pending.len();
        if let Some(handler) = &self.handler {
            handler.on_context_message(pending).await?;
        }
        self.persisted += count;
        Ok(())
    }
}

#[async_trait]
impl FrameProcessor for StorageProcessor {
    fn name(&self) -> &'static str {
        "storage"
    }

    async fn process(&mut self, frame: Frame) -> Result<Vec<Frame>, VoiceError> {
        if self.finished {
            return Ok(Vec::new());
        }

        self.flush().await?;

        if matches!(frame, Frame::End) && self.exit_on_endframe {
            debug!(persisted = self.persisted, "storage finished");
            self.finished = true;
        }
        Ok(vec![frame])
    }
}
