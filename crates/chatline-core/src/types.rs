//! Domain types for chat sessions and messages.
//!
//! The serialized form uses camelCase field names and epoch-millisecond
//! timestamps, which is the shape of the durable `chat-store` record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, SessionId};

/// Title given to sessions created without one.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Typed (or dictated) by the user.
    User,
    /// Streamed back from the remote endpoint.
    Assistant,
}

impl MessageRole {
    /// Human-readable label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier, assigned by the store.
    pub id: MessageId,
    /// Author of the message.
    #[serde(rename = "type")]
    pub role: MessageRole,
    /// Display text.
    pub content: String,
    /// When the message was created.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Attached or generated image, either a URL or an inline `data:` URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Set while an assistant reply is still arriving.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_streaming: Option<bool>,
}

impl Message {
    /// Whether the message is still receiving fragments.
    #[must_use]
    pub fn streaming(&self) -> bool {
        self.is_streaming.unwrap_or(false)
    }
}

/// A message that has not yet been given an identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    /// Author of the message.
    pub role: MessageRole,
    /// Display text.
    pub content: String,
    /// When the message was created.
    pub timestamp: DateTime<Utc>,
    /// Optional image URL.
    pub image_url: Option<String>,
    /// Optional streaming marker.
    pub is_streaming: Option<bool>,
}

impl NewMessage {
    /// A user message with optional image attachment.
    #[must_use]
    pub fn user(content: impl Into<String>, image_url: Option<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            image_url,
            is_streaming: None,
        }
    }

    /// An empty assistant message that will be filled in by streaming.
    #[must_use]
    pub fn assistant_placeholder() -> Self {
        Self {
            role: MessageRole::Assistant,
            content: String::new(),
            timestamp: Utc::now(),
            image_url: None,
            is_streaming: Some(true),
        }
    }

    /// Attach an identifier, producing a storable message.
    #[must_use]
    pub fn with_id(self, id: MessageId) -> Message {
        Message {
            id,
            role: self.role,
            content: self.content,
            timestamp: self.timestamp,
            image_url: self.image_url,
            is_streaming: self.is_streaming,
        }
    }
}

/// Field-by-field partial update of a [`Message`].
///
/// `None` leaves a field untouched. For the optional fields, `Some(None)`
/// clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageUpdate {
    /// Replacement content.
    pub content: Option<String>,
    /// Replacement image URL.
    pub image_url: Option<Option<String>>,
    /// Replacement streaming marker.
    pub is_streaming: Option<Option<bool>>,
}

impl MessageUpdate {
    /// Returns `true` if the update would not change anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.image_url.is_none() && self.is_streaming.is_none()
    }

    /// Merge the set fields into `message`.
    pub fn apply_to(self, message: &mut Message) {
        if let Some(content) = self.content {
            message.content = content;
        }
        if let Some(image_url) = self.image_url {
            message.image_url = image_url;
        }
        if let Some(is_streaming) = self.is_streaming {
            message.is_streaming = is_streaming;
        }
    }
}

/// A chat session: an ordered conversation with a title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique identifier.
    pub id: SessionId,
    /// User-visible title.
    pub title: String,
    /// Messages in the order they were appended.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Creation timestamp.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create an empty session with a fresh identifier.
    #[must_use]
    pub fn new(title: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::generate(),
            title: title
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_SESSION_TITLE)
                .to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the session as modified now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Find a message by identifier.
    #[must_use]
    pub fn message(&self, message_id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == *message_id)
    }

    /// Find a message by identifier for modification.
    pub fn message_mut(&mut self, message_id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == *message_id)
    }
}
