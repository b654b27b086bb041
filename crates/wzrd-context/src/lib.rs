//! LLM context construction for digital-twin conversations.
//!
//! Turns stored records into the state a realtime LLM session starts from:
//!
//! - [`prompt`] renders a twin's persona into a system prompt;
//! - [`twins`] and [`conversations`] read (and write) the backing tables;
//! - [`context`] combines them into an [`LlmContext`] whose first message
//!   is the system prompt, unless the history already opens with one.
//!
//! Persona data is optional throughout. A conversation without a twin, or
//! a twin that cannot be read, yields a context seeded with the fallback
//! prompt instead of an error.

pub mod context;
pub mod conversations;
mod error;
pub mod prompt;
pub mod twins;

pub use context::{initialize_chat_context, prepend_system_prompt, InitializedContext, LlmContext};
pub use conversations::{
    conversation_twin_id, create_conversation, create_messages, get_conversation, list_messages,
    NewConversation,
};
pub use error::ContextError;
pub use prompt::{build_system_prompt, DEFAULT_SYSTEM_PROMPT, DEFAULT_TWIN_NAME};
pub use twins::{create_twin, fetch_twin, lookup_twin, NewTwin};
