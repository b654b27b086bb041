//! Error types for context construction and conversation storage.

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("context database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),
}
