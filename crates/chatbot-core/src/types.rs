//! Wire types shared by the chat pipeline and the backend REST client.
//!
//! Every type serialises camelCase. Inbound payloads from the backend use
//! snake_case field names (and a few legacy spellings), which are accepted
//! as serde aliases so only one schema exists on the client side.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::{ConversationId, MessageId, UserId};

/// Current time formatted the way the backend stores message timestamps.
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

// =============================================================================
// Messages
// =============================================================================

/// Author role of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human participant.
    User,
    /// The model.
    Assistant,
}

/// One entry in a transcript.
///
/// `content` is display-ready markup for assistant messages and the raw
/// text the user typed for user messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message identifier.
    #[serde(alias = "message_id")]
    pub id: MessageId,
    /// Whether the user authored this message.
    #[serde(alias = "from_user")]
    pub is_from_user: bool,
    /// Message content.
    pub content: String,
    /// Creation timestamp.
    #[serde(default)]
    pub timestamp: String,
    /// Whether this message is a terminal error entry.
    #[serde(default, alias = "is_error")]
    pub is_error: bool,
    /// Conversation this message belongs to.
    #[serde(alias = "conversation_id")]
    pub conversation_id: ConversationId,
    /// Owner of the conversation.
    #[serde(alias = "user_id")]
    pub user_id: UserId,
}

impl Message {
    /// Create a new user message stamped with the current time.
    #[must_use]
    pub fn user(
        conversation_id: ConversationId,
        user_id: UserId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            is_from_user: true,
            content: content.into(),
            timestamp: now_timestamp(),
            is_error: false,
            conversation_id,
            user_id,
        }
    }

    /// Create a new assistant message stamped with the current time.
    #[must_use]
    pub fn assistant(
        conversation_id: ConversationId,
        user_id: UserId,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            is_from_user: false,
            content: content.into(),
            timestamp: now_timestamp(),
            is_error,
            conversation_id,
            user_id,
        }
    }

    /// Whether this message was produced by the assistant.
    #[must_use]
    pub const fn is_assistant(&self) -> bool {
        !self.is_from_user
    }
}

// =============================================================================
// Chat Request
// =============================================================================

/// Prior turn sent alongside a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistoryEntry {
    /// Author of the turn.
    pub role: Role,
    /// Raw text of the turn.
    pub content: String,
}

/// Body of `POST /chat`.
///
/// Built once per submission and only read afterwards; there are no
/// setters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    user_id: UserId,
    username: String,
    user_role: String,
    conversation_id: ConversationId,
    role: Role,
    content: String,
    history: Vec<ChatHistoryEntry>,
    model: String,
    model_name: String,
}

impl ChatRequest {
    /// Build a request for a user turn.
    #[must_use]
    pub fn new(
        user: &User,
        conversation_id: ConversationId,
        model: &AiModel,
        content: impl Into<String>,
        history: Vec<ChatHistoryEntry>,
    ) -> Self {
        Self {
            user_id: user.id.clone(),
            username: user.username.clone(),
            user_role: user.role.clone(),
            conversation_id,
            role: Role::User,
            content: content.into(),
            history,
            model: model.model.clone(),
            model_name: model.model_name.clone(),
        }
    }

    /// Requesting user.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Requesting user's login name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Requesting user's role.
    #[must_use]
    pub fn user_role(&self) -> &str {
        &self.user_role
    }

    /// Target conversation.
    #[must_use]
    pub const fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Role of the submitted turn.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Submitted text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Prior turns.
    #[must_use]
    pub fn history(&self) -> &[ChatHistoryEntry] {
        &self.history
    }

    /// Model provider key (e.g. `ollama`).
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Provider-specific model name (e.g. `mistral`).
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

// =============================================================================
// Collaborator Types
// =============================================================================

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Login name.
    pub username: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Role name (`user` or `admin`).
    pub role: String,
}

impl User {
    /// Build a user from raw strings.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not a valid identifier.
    pub fn new(id: &str, username: impl Into<String>, role: impl Into<String>) -> Result<Self> {
        let username = username.into();
        Ok(Self {
            id: UserId::new(id)?,
            name: username.clone(),
            username,
            role: role.into(),
        })
    }
}

/// A model the backend can answer with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiModel {
    /// Provider key.
    pub model: String,
    /// Provider-specific model name.
    pub model_name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
}

/// A conversation summary as listed in the sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Conversation identifier.
    #[serde(alias = "chatId")]
    pub id: ConversationId,
    /// Title.
    pub title: String,
    /// Creation timestamp.
    #[serde(default, alias = "createdAt")]
    pub timestamp: String,
}

/// A file known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Name the file is stored under on the server.
    pub name: String,
    /// Name the file was uploaded with.
    #[serde(alias = "orginal_name", alias = "file_name")]
    pub file_name: String,
    /// File extension without the dot.
    #[serde(default)]
    pub extension: String,
    /// Uploader.
    #[serde(default)]
    pub username: String,
    /// Upload timestamp.
    #[serde(default)]
    pub timestamp: String,
}

/// A named group of files (`System`, `Personal`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileGroup {
    /// Group name.
    pub name: String,
    /// Files in the group.
    #[serde(default)]
    pub list_files: Vec<FileEntry>,
}
