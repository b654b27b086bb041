//! LLM context seeding.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use wzrd_types::{ChatMessage, Tools, TwinRecord};

use crate::conversations::{get_conversation, list_messages};
use crate::error::ContextError;
use crate::prompt::build_system_prompt;
use crate::twins::lookup_twin;

/// Message history plus tool configuration for one LLM session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmContext {
    messages: Vec<ChatMessage>,
    tools: Tools,
}

impl LlmContext {
    pub fn new(messages: Vec<ChatMessage>, tools: Tools) -> Self {
        Self { messages, tools }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn tools(&self) -> &Tools {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn add_messages(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.messages.extend(messages);
    }

    /// Returns the system instructions, if the history opens with them.
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.is_system())
            .map(|m| m.content.as_str())
    }
}

/// Result of [`initialize_chat_context`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializedContext {
    pub context: LlmContext,
    /// The persona the prompt was rendered from, if one was found.
    pub twin: Option<TwinRecord>,
}

/// Puts `prompt` in front of `messages` as a system message.
///
/// Does nothing when the prompt is empty or the history already opens with
/// a system message; an existing system message is never replaced. Returns
/// whether a message was inserted.
pub fn prepend_system_prompt(messages: &mut Vec<ChatMessage>, prompt: &str) -> bool {
    if prompt.is_empty() || messages.first().is_some_and(ChatMessage::is_system) {
        return false;
    }
    messages.insert(0, ChatMessage::system(prompt));
    true
}

/// Builds the starting context for a conversation.
///
/// The twin is taken from `twin_id` when given and non-blank, otherwise
/// from the conversation record. Persona lookup is best effort: without a twin the
/// `fallback_prompt` seeds the context instead.
///
/// # Errors
///
/// Returns `ContextError::ConversationNotFound` if the conversation does not
/// exist, or a database error if its messages cannot be read.
pub fn initialize_chat_context(
    conn: &Connection,
    conversation_id: &str,
    twin_id: Option<&str>,
    tools: Tools,
    fallback_prompt: &str,
) -> Result<InitializedContext, ContextError> {
    let conversation = get_conversation(conn, conversation_id)?;

    let twin_id = twin_id
        .filter(|id| !id.trim().is_empty())
        .or(conversation.twin_id.as_deref());
    let twin = lookup_twin(conn, twin_id);

    let mut messages = list_messages(conn, conversation_id)?;
    let prompt = build_system_prompt(twin.as_ref(), fallback_prompt);
    let inserted = prepend_system_prompt(&mut messages, &prompt);

    tracing::debug!(
        conversation_id,
        twin_id = twin_id.unwrap_or("<none>"),
        messages = messages.len(),
        system_prompt_inserted = inserted,
        "initialized chat context"
    );

    Ok(InitializedContext {
        context: LlmContext::new(messages, tools),
        twin,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_gets_single_system_message() {
        let mut messages = Vec::new();
        assert!(prepend_system_prompt(&mut messages, "be kind"));
        assert_eq!(messages, vec![ChatMessage::system("be kind")]);
    }

    #[test]
    fn existing_system_message_is_kept() {
        let mut messages = vec![ChatMessage::system("original"), ChatMessage::user("hi")];
        assert!(!prepend_system_prompt(&mut messages, "replacement"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], ChatMessage::system("original"));
    }

    #[test]
    fn prompt_goes_before_user_history() {
        let mut messages = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        assert!(prepend_system_prompt(&mut messages, "persona"));
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], ChatMessage::system("persona"));
        assert_eq!(messages[1], ChatMessage::user("hi"));
    }

    #[test]
    fn empty_prompt_inserts_nothing() {
        let mut messages = vec![ChatMessage::user("hi")];
        assert!(!prepend_system_prompt(&mut messages, ""));
        assert_eq!(messages, vec![ChatMessage::user("hi")]);
    }

    #[test]
    fn context_exposes_leading_system_prompt() {
        let mut context = LlmContext::new(vec![ChatMessage::system("rules")], Tools::NotGiven);
        assert_eq!(context.system_prompt(), Some("rules"));
        context.add_message(ChatMessage::user("hi"));
        assert_eq!(context.len(), 2);

        let plain = LlmContext::new(vec![ChatMessage::user("hi")], Tools::NotGiven);
        assert_eq!(plain.system_prompt(), None);
    }
}
