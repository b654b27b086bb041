//! RTVI client event protocol.
//!
//! Clients talk to the bot with JSON messages on the room's data channel.
//! [`RtviProcessor`] handles what the client sends (readiness and actions);
//! the observer stages further down the pipeline report what the bot and
//! user are doing back to the client.

use crate::aggregator::SharedContext;
use crate::error::VoiceError;
use crate::frame::Frame;
use crate::processor::FrameProcessor;
use crate::transport::OutboundMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use wzrd_types::ChatMessage;

pub const RTVI_LABEL: &str = "rtvi-ai";
pub const RTVI_PROTOCOL_VERSION: &str = "0.3.0";

/// A message received from the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtviClientMessage {
    pub id: String,
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Option<Value>,
}

fn default_label() -> String {
    RTVI_LABEL.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtviActionArgument {
    pub name: String,
    pub value: Value,
}

/// A service action requested by the client, e.g. `llm:run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtviAction {
    pub service: String,
    pub action: String,
    #[serde(default)]
    pub arguments: Vec<RtviActionArgument>,
}

impl RtviAction {
    pub fn new(service: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            action: action.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.push(RtviActionArgument {
            name: name.into(),
            value,
        });
        self
    }

    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }

    fn qualified_name(&self) -> String {
        format!("{}:{}", self.service, self.action)
    }
}

/// Payload of a message sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum RtviEvent {
    BotReady {
        version: String,
        config: Vec<Value>,
    },
    UserStartedSpeaking,
    UserStoppedSpeaking,
    BotStartedSpeaking,
    BotStoppedSpeaking,
    UserTranscription {
        text: String,
        user_id: String,
        timestamp: String,
        #[serde(rename = "final")]
        is_final: bool,
    },
    BotTranscription {
        text: String,
    },
    BotLlmStarted,
    BotLlmText {
        text: String,
    },
    BotLlmStopped,
    BotTtsStarted,
    BotTtsText {
        text: String,
    },
    BotTtsStopped,
    ActionResponse {
        result: Value,
    },
    ErrorResponse {
        error: String,
    },
    Error {
        error: String,
        fatal: bool,
    },
}

/// A message sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RtviServerMessage {
    pub label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub event: RtviEvent,
}

impl RtviServerMessage {
    pub fn new(event: RtviEvent) -> Self {
        Self {
            label: RTVI_LABEL,
            id: None,
            event,
        }
    }

    pub fn reply(id: impl Into<String>, event: RtviEvent) -> Self {
        Self {
            label: RTVI_LABEL,
            id: Some(id.into()),
            event,
        }
    }
}

/// Sends RTVI messages to the room as app messages.
#[derive(Debug, Clone)]
pub struct RtviSink {
    outbound: broadcast::Sender<OutboundMessage>,
}

impl RtviSink {
    pub fn new(outbound: broadcast::Sender<OutboundMessage>) -> Self {
        Self { outbound }
    }

    pub fn send(&self, message: RtviServerMessage) -> Result<(), VoiceError> {
        let value = serde_json::to_value(&message)
            .map_err(|e| VoiceError::Rtvi(format!("failed to encode message: {e}")))?;
        if self.outbound.send(OutboundMessage::App(value)).is_err() {
            debug!("no room listeners for RTVI message");
        }
        Ok(())
    }

    pub fn event(&self, event: RtviEvent) -> Result<(), VoiceError> {
        self.send(RtviServerMessage::new(event))
    }
}

/// Called when the client reports that it is ready.
#[async_trait]
pub trait ClientReadyHandler: Send + Sync {
    /// Returns frames to push downstream of the RTVI stage.
    async fn on_client_ready(&self, rtvi: &mut RtviProcessor) -> Result<Vec<Frame>, VoiceError>;
}

/// Handles client messages and tracks the ready handshake.
pub struct RtviProcessor {
    sink: RtviSink,
    context: SharedContext,
    ready_handlers: Vec<Arc<dyn ClientReadyHandler>>,
    client_ready: bool,
    bot_ready: bool,
}

impl std::fmt::Debug for RtviProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtviProcessor")
            .field("client_ready", &self.client_ready)
            .field("bot_ready", &self.bot_ready)
            .field("ready_handlers", &self.ready_handlers.len())
            .finish()
    }
}

impl RtviProcessor {
    pub fn new(sink: RtviSink, context: SharedContext) -> Self {
        Self {
            sink,
            context,
            ready_handlers: Vec::new(),
            client_ready: false,
            bot_ready: false,
        }
    }

    pub fn on_client_ready(&mut self, handler: Arc<dyn ClientReadyHandler>) {
        self.ready_handlers.push(handler);
    }

    pub fn is_client_ready(&self) -> bool {
        self.client_ready
    }

    pub fn is_bot_ready(&self) -> bool {
        self.bot_ready
    }

    pub fn sink(&self) -> &RtviSink {
        &self.sink
    }

    /// Tells the client the bot is ready to talk.
    pub fn set_bot_ready(&mut self) -> Result<(), VoiceError> {
        self.bot_ready = true;
        info!("bot ready");
        self.sink.event(RtviEvent::BotReady {
            version: RTVI_PROTOCOL_VERSION.to_string(),
            config: Vec::new(),
        })
    }

    /// Runs one client action and returns the frames it produces.
    ///
    /// Supported actions:
    /// - `llm:append_to_messages` adds `messages` to the context and, unless
    ///   `run_immediately` is false, asks the LLM to respond;
    /// - `llm:run` asks the LLM to respond.
    pub fn handle_message(&mut self, action: &RtviAction) -> Result<Vec<Frame>, VoiceError> {
        debug!(action = %action.qualified_name(), "handling RTVI action");

        match (action.service.as_str(), action.action.as_str()) {
            ("llm", "append_to_messages") => {
                let messages = action
                    .argument("messages")
                    .cloned()
                    .ok_or_else(|| VoiceError::Rtvi("missing argument: messages".to_string()))?;
                let messages: Vec<ChatMessage> = serde_json::from_value(messages)
                    .map_err(|e| VoiceError::Rtvi(format!("invalid messages: {e}")))?;
                let run_immediately = action
                    .argument("run_immediately")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);

                self.context
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .add_messages(messages);

                Ok(if run_immediately {
                    vec![Frame::LlmRun]
                } else {
                    Vec::new()
                })
            }
            ("llm", "run") => Ok(vec![Frame::LlmRun]),
            _ => Err(VoiceError::Rtvi(format!(
                "unsupported action: {}",
                action.qualified_name()
            ))),
        }
    }

    async fn client_ready(&mut self) -> Result<Vec<Frame>, VoiceError> {
        self.client_ready = true;
        info!("client ready");

        let handlers = self.ready_handlers.clone();
        let mut frames = Vec::new();
        for handler in handlers {
            frames.extend(handler.on_client_ready(self).await?);
        }
        Ok(frames)
    }

    fn client_action(&mut self, message: &RtviClientMessage) -> Result<Vec<Frame>, VoiceError> {
        let action = message
            .data
            .clone()
            .ok_or_else(|| VoiceError::Rtvi("action message without data".to_string()))
            .and_then(|data| {
                serde_json::from_value::<RtviAction>(data)
                    .map_err(|e| VoiceError::Rtvi(format!("invalid action: {e}")))
            });

        match action.and_then(|action| self.handle_message(&action)) {
            Ok(frames) => {
                self.sink.send(RtviServerMessage::reply(
                    &message.id,
                    RtviEvent::ActionResponse {
                        result: json!(true),
                    },
                ))?;
                Ok(frames)
            }
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "RTVI action failed");
                self.sink.send(RtviServerMessage::reply(
                    &message.id,
                    RtviEvent::ErrorResponse {
                        error: e.to_string(),
                    },
                ))?;
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl FrameProcessor for RtviProcessor {
    fn name(&self) -> &'static str {
        "rtvi"
    }

    async fn process(&mut self, frame: Frame) -> Result<Vec<Frame>, VoiceError> {
        let Frame::ClientMessage(message) = frame else {
            return Ok(vec![frame]);
        };

        match message.kind.as_str() {
            "client-ready" => self.client_ready().await,
            "action" => self.client_action(&message),
            other => {
                warn!(kind = other, "unsupported RTVI message");
                self.sink.send(RtviServerMessage::reply(
                    &message.id,
                    RtviEvent::ErrorResponse {
                        error: format!("unsupported message type: {other}"),
                    },
                ))?;
                Ok(Vec::new())
            }
        }
    }
}

/// Reports user and bot speaking turns.
#[derive(Debug)]
pub struct RtviSpeakingProcessor {
    sink: RtviSink,
}

impl RtviSpeakingProcessor {
    pub fn new(sink: RtviSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl FrameProcessor for RtviSpeakingProcessor {
    fn name(&self) -> &'static str {
        "rtvi_speaking"
    }

    async fn process(&mut self, frame: Frame) -> Result<Vec<Frame>, VoiceError> {
        let event = match frame {
            Frame::UserStartedSpeaking => Some(RtviEvent::UserStartedSpeaking),
            Frame::UserStoppedSpeaking => Some(RtviEvent::UserStoppedSpeaking),
            Frame::BotStartedSpeaking => Some(RtviEvent::BotStartedSpeaking),
            Frame::BotStoppedSpeaking => Some(RtviEvent::BotStoppedSpeaking),
            _ => None,
        };
        if let Some(event) = event {
            self.sink.event(event)?;
        }
        Ok(vec![frame])
    }
}

/// Reports what the user said.
#[derive(Debug)]
pub struct RtviUserTranscriptionProcessor {
    sink: RtviSink,
}

impl RtviUserTranscriptionProcessor {
    pub fn new(sink: RtviSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl FrameProcessor for RtviUserTranscriptionProcessor {
    fn name(&self) -> &'static str {
        "rtvi_user_transcription"
    }

    async fn process(&mut self, frame: Frame) -> Result<Vec<Frame>, VoiceError> {
        if let Frame::Transcription {
            text,
            user_id,
            is_final,
        } = &frame
        {
            self.sink.event(RtviEvent::UserTranscription {
                text: text.clone(),
                user_id: user_id.clone(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                is_final: *is_final,
            })?;
        }
        Ok(vec![frame])
    }
}

/// Reports LLM output and pipeline errors.
#[derive(Debug)]
pub struct RtviBotLlmProcessor {
    sink: RtviSink,
}

impl RtviBotLlmProcessor {
    pub fn new(sink: RtviSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl FrameProcessor for RtviBotLlmProcessor {
    fn name(&self) -> &'static str {
        "rtvi_bot_llm"
    }

    async fn process(&mut self, frame: Frame) -> Result<Vec<Frame>, VoiceError> {
        let event = match &frame {
            Frame::LlmResponseStart => Some(RtviEvent::BotLlmStarted),
            Frame::LlmText(text) => Some(RtviEvent::BotLlmText { text: text.clone() }),
            Frame::LlmResponseEnd => Some(RtviEvent::BotLlmStopped),
            Frame::Error(error) => Some(RtviEvent::Error {
                error: error.clone(),
                fatal: false,
            }),
            _ => None,
        };
        if let Some(event) = event {
            self.sink.event(event)?;
        }
        Ok(vec![frame])
    }
}

/// Reports what the bot said.
#[derive(Debug)]
pub struct RtviBotTranscriptionProcessor {
    sink: RtviSink,
}

impl RtviBotTranscriptionProcessor {
    pub fn new(sink: RtviSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl FrameProcessor for RtviBotTranscriptionProcessor {
    fn name(&self) -> &'static str {
        "rtvi_bot_transcription"
    }

    async fn process(&mut self, frame: Frame) -> Result<Vec<Frame>, VoiceError> {
        if let Frame::BotTranscription(text) = &frame {
            self.sink
                .event(RtviEvent::BotTranscription { text: text.clone() })?;
        }
        Ok(vec![frame])
    }
}

#[derive(Debug)]
pub struct RtviBotTtsProcessor {
    sink: RtviSink,
}

impl RtviBotTtsProcessor {
    pub fn new(sink: RtviSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl FrameProcessor for RtviBotTtsProcessor {
    fn name(&self) -> &'static str {
        "rtvi_bot_tts"
    }

    async fn process(&mut self, frame: Frame) -> Result<Vec<Frame>, VoiceError> {
        let event = match &frame {
            Frame::TtsStarted => Some(RtviEvent::BotTtsStarted),
            Frame::TtsText(text) => Some(RtviEvent::BotTtsText { text: text.clone() }),
            Frame::TtsStopped => Some(RtviEvent::BotTtsStopped),
            _ => None,
        };
        if let Some(event) = event {
            self.sink.event(event)?;
        }
        Ok(vec![frame])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wzrd_context::LlmContext;
    use wzrd_types::Tools;

    fn setup() -> (
        RtviProcessor,
        SharedContext,
        broadcast::Receiver<OutboundMessage>,
    ) {
        let (tx, rx) = broadcast::channel(16);
        let context = Arc::new(Mutex::new(LlmContext::new(
            vec![ChatMessage::system("persona")],
            Tools::NotGiven,
        )));
        (RtviProcessor::new(RtviSink::new(tx), context.clone()), context, rx)
    }

    fn app_message(rx: &mut broadcast::Receiver<OutboundMessage>) -> Value {
        match rx.try_recv().expect("message sent") {
            OutboundMessage::App(value) => value,
            other => panic!("expected app message, got {other:?}"),
        }
    }

    #[test]
    fn server_messages_carry_label_type_and_data() {
        let message = RtviServerMessage::new(RtviEvent::BotLlmText {
            text: "hi".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"label": "rtvi-ai", "type": "bot-llm-text", "data": {"text": "hi"}})
        );

        let unit = RtviServerMessage::new(RtviEvent::UserStartedSpeaking);
        assert_eq!(
            serde_json::to_value(&unit).unwrap(),
            json!({"label": "rtvi-ai", "type": "user-started-speaking"})
        );
    }

    #[test]
    fn append_to_messages_updates_context_and_runs() {
        let (mut rtvi, context, _rx) = setup();
        let action = RtviAction::new("llm", "append_to_messages").with_argument(
            "messages",
            json!([{"role": "user", "content": "hello"}]),
        );

        let frames = rtvi.handle_message(&action).unwrap();
        assert_eq!(frames, vec![Frame::LlmRun]);

        let context = context.lock().unwrap();
        assert_eq!(context.len(), 2);
        assert_eq!(context.messages()[1], ChatMessage::user("hello"));
    }

    #[test]
    fn append_without_run_immediately_does_not_run() {
        let (mut rtvi, _context, _rx) = setup();
        let action = RtviAction::new("llm", "append_to_messages")
            .with_argument("messages", json!([{"role": "user", "content": "x"}]))
            .with_argument("run_immediately", json!(false));

        assert!(rtvi.handle_message(&action).unwrap().is_empty());
    }

    #[test]
    fn unknown_action_is_rejected() {
        let (mut rtvi, _context, _rx) = setup();
        let err = rtvi
            .handle_message(&RtviAction::new("tts", "say"))
            .unwrap_err();
        assert!(err.to_string().contains("tts:say"));
    }

    #[tokio::test]
    async fn action_message_gets_response() {
        let (mut rtvi, _context, mut rx) = setup();
        let message = RtviClientMessage {
            id: "m1".to_string(),
            label: RTVI_LABEL.to_string(),
            kind: "action".to_string(),
            data: Some(json!({"service": "llm", "action": "run", "arguments": []})),
        };

        let frames = rtvi.process(Frame::ClientMessage(message)).await.unwrap();
        assert_eq!(frames, vec![Frame::LlmRun]);

        let response = app_message(&mut rx);
        assert_eq!(response["type"], "action-response");
        assert_eq!(response["id"], "m1");
    }

    #[tokio::test]
    async fn client_ready_runs_handlers() {
        struct Ready;

        #[async_trait]
        impl ClientReadyHandler for Ready {
            async fn on_client_ready(
                &self,
                rtvi: &mut RtviProcessor,
            ) -> Result<Vec<Frame>, VoiceError> {
                rtvi.set_bot_ready()?;
                Ok(vec![Frame::LlmRun])
            }
        }

        let (mut rtvi, _context, mut rx) = setup();
        rtvi.on_client_ready(Arc::new(Ready));

        let message: RtviClientMessage =
            serde_json::from_value(json!({"id": "c1", "type": "client-ready"})).unwrap();
        let frames = rtvi.process(Frame::ClientMessage(message)).await.unwrap();

        assert!(rtvi.is_client_ready());
        assert!(rtvi.is_bot_ready());
        assert_eq!(frames, vec![Frame::LlmRun]);

        let ready = app_message(&mut rx);
        assert_eq!(ready["type"], "bot-ready");
        assert_eq!(ready["data"]["version"], RTVI_PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn llm_observer_reports_errors() {
        let (tx, mut rx) = broadcast::channel(4);
        let mut observer = RtviBotLlmProcessor::new(RtviSink::new(tx));

        let frames = observer
            .process(Frame::Error("model unavailable".to_string()))
            .await
            .unwrap();
        assert_eq!(frames.len(), 1);

        let error = app_message(&mut rx);
        assert_eq!(error["type"], "error");
        assert_eq!(error["data"]["fatal"], false);
    }
}
