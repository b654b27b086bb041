use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("LiveKit API error: {0}")]
    LiveKit(#[from] livekit_api::access_token::AccessTokenError),

    #[error("Room service error: {0}")]
    RoomService(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Context error: {0}")]
    Context(#[from] wzrd_context::ContextError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Failed to store messages: {0}")]
    Storage(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RTVI error: {0}")]
    Rtvi(String),
}
