//! Conversation and message persistence.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use wzrd_types::{ChatMessage, Conversation};

use crate::error::ContextError;

/// Parameters for creating a conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewConversation {
    pub id: String,
    pub twin_id: Option<String>,
    pub user_id: Option<String>,
    pub title: Option<String>,
}

/// Inserts a conversation and returns it as stored.
pub fn create_conversation(
    conn: &Connection,
    new: &NewConversation,
) -> Result<Conversation, ContextError> {
    conn.execute(
        "INSERT INTO conversations (id, twin_id, user_id, title) VALUES (?1, ?2, ?3, ?4)",
        params![new.id, new.twin_id, new.user_id, new.title],
    )?;
    get_conversation(conn, &new.id)
}

/// Reads a conversation by ID.
pub fn get_conversation(conn: &Connection, conversation_id: &str) -> Result<Conversation, ContextError> {
    conn.query_row(
        "SELECT id, twin_id, user_id, title, created_at, updated_at
         FROM conversations WHERE id = ?1",
        [conversation_id],
        map_row_to_conversation,
    )
    .optional()?
    .ok_or_else(|| ContextError::ConversationNotFound(conversation_id.to_string()))
}

/// Returns the twin a conversation is held with.
///
/// Best effort: a missing conversation, a conversation without a twin, and
/// a failed query all yield `None`. Failures are logged.
pub fn conversation_twin_id(conn: &Connection, conversation_id: &str) -> Option<String> {
    match get_conversation(conn, conversation_id) {
        Ok(conversation) => conversation.twin_id,
        Err(ContextError::ConversationNotFound(_)) => None,
        Err(e) => {
            tracing::error!(conversation_id, error = %e, "failed to fetch twin_id for conversation");
            None
        }
    }
}

/// Returns the stored turns of a conversation, oldest first.
///
/// Rows whose payload does not decode as a chat message are skipped with a
/// warning.
pub fn list_messages(conn: &Connection, conversation_id: &str) -> Result<Vec<ChatMessage>, ContextError> {
    let mut stmt = conn.prepare(
        "SELECT message_id, content_json FROM messages WHERE conversation_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([conversation_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut messages = Vec::new();
    for row in rows {
        let (message_id, content_json) = row?;
        match serde_json::from_str(&content_json) {
            Ok(message) => messages.push(message),
            Err(e) => {
                tracing::warn!(conversation_id, message_id, error = %e, "skipping undecodable message");
            }
        }
    }
    Ok(messages)
}

/// Appends a batch of turns to a conversation.
///
/// The batch is written in one transaction: either every message lands or
/// none does. Returns the number of messages stored.
pub fn create_messages(
    conn: &Connection,
    conversation_id: &str,
    messages: &[ChatMessage],
) -> Result<usize, ContextError> {
    if messages.is_empty() {
        return Ok(0);
    }

    let tx = conn.unchecked_transaction()?;
    {
        let mut insert = tx.prepare(
            "INSERT INTO messages (message_id, conversation_id, role, content_json)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for message in messages {
            let content_json = serde_json::to_string(message)?;
            insert.execute(params![
                uuid::Uuid::new_v4().to_string(),
                conversation_id,
                message.role.as_str(),
                content_json,
            ])?;
        }
    }
    tx.execute(
        "UPDATE conversations SET updated_at = datetime('now') WHERE id = ?1",
        [conversation_id],
    )?;
    tx.commit()?;

    Ok(messages.len())
}

fn map_row_to_conversation(row: &Row) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        twin_id: row.get(1)?,
        user_id: row.get(2)?,
        title: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
