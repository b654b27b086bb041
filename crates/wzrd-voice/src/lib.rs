//! Voice bot runtime for digital-twin conversations.
//!
//! A bot session is a [`Pipeline`] of frame processors sitting between a
//! LiveKit room transport and a multimodal LLM. The pipeline keeps the
//! conversation's [`LlmContext`](wzrd_context::LlmContext) current,
//! persists every new message, and reports progress to the client over the
//! RTVI event protocol.
//!
//! [`bot_pipeline`] assembles a session for one conversation;
//! [`RoomService`] manages LiveKit rooms and join tokens for it.

pub mod aggregator;
pub mod bot;
pub mod config;
pub mod error;
pub mod frame;
pub mod gemini;
pub mod llm;
pub mod pipeline;
pub mod processor;
pub mod rtvi;
pub mod service;
pub mod storage;
pub mod transport;
pub mod vad;

pub use aggregator::{create_context_aggregator, shared_context, SharedContext};
pub use bot::{bot_pipeline, BotCallbacks, BotConfig, BotParams, BotPipeline, DEFAULT_BOT_NAME};
pub use config::{GeminiConfig, LiveKitConfig};
pub use error::VoiceError;
pub use frame::{AudioChunk, Frame};
pub use gemini::GeminiClient;
pub use llm::{LlmBackend, LlmReply, LlmRequest, MultimodalLlmService};
pub use pipeline::Pipeline;
pub use processor::FrameProcessor;
pub use rtvi::{RtviAction, RtviClientMessage, RtviServerMessage};
pub use service::RoomService;
pub use storage::{ContextMessageHandler, PersistentContext, StorageProcessor};
pub use transport::{CallState, OutboundMessage, RoomTransport, TransportEvent};
