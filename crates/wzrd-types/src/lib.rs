//! Shared types for the WZRD digital-twin voice bot.
//!
//! This crate holds the records every other crate passes around: chat
//! messages and their roles, stored conversations, digital twin (persona)
//! records, and the tool configuration that seeds an LLM context. Voice
//! transport parameters live in [`voice`].
//!
//! Nothing here touches the database or the network; `wzrd-db`,
//! `wzrd-context` and `wzrd-voice` build on these definitions.

use serde::{Deserialize, Serialize};

pub mod voice;

/// Speaker role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the whole conversation.
    System,
    /// A turn spoken or typed by the human participant.
    User,
    /// A turn produced by the model.
    Assistant,
}

impl Role {
    /// Returns the wire label for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown role label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRoleError(pub String);

impl std::fmt::Display for ParseRoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown message role: {}", self.0)
    }
}

impl std::error::Error for ParseRoleError {}

/// One turn of a conversation, in the `{ "role", "content" }` shape LLM
/// services consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Returns `true` if this message carries system instructions.
    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// Tool configuration handed to the LLM together with the message history.
///
/// `NotGiven` is distinct from an empty list: it means the request carries
/// no `tools` field at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "tools")]
pub enum Tools {
    #[default]
    NotGiven,
    /// Tool declarations as raw JSON schemas.
    List(Vec<serde_json::Value>),
}

impl Tools {
    pub fn is_given(&self) -> bool {
        matches!(self, Self::List(_))
    }
}

/// A stored chat session between a user and a digital twin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Public conversation ID.
    pub id: String,
    /// The twin this conversation talks to, if any.
    pub twin_id: Option<String>,
    /// Owner of the conversation.
    pub user_id: Option<String>,
    /// Optional display title.
    pub title: Option<String>,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last update timestamp (ISO 8601).
    pub updated_at: String,
}

/// Personality traits stored in the `features` column of a twin.
///
/// Keys beyond `bio`, `lore` and `knowledge` are preserved in `extra` but
/// never rendered into prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TwinFeatures {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lore: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TwinFeatures {
    pub fn is_empty(&self) -> bool {
        self.bio.is_none() && self.lore.is_none() && self.knowledge.is_none() && self.extra.is_empty()
    }
}

/// A digital twin: the persona a conversation is held with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TwinRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub features: TwinFeatures,
    /// Free-form model settings. Carried along, never rendered.
    #[serde(default)]
    pub model_data: serde_json::Map<String, serde_json::Value>,
}

impl TwinRecord {
    /// Returns `true` when the record carries nothing a prompt could use.
    pub fn is_empty(&self) -> bool {
        self.name.trim().is_empty()
            && self
                .description
                .as_deref()
                .map_or(true, |d| d.trim().is_empty())
            && self.features.is_empty()
    }
}
