//! Conversation and message model shared by the store and the stream controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::chat::ids::{ConversationId, MessageId};

/// Title given to conversations that have not been named yet.
pub const DEFAULT_TITLE: &str = "New conversation";

/// Maximum number of characters kept when deriving a title.
pub const TITLE_MAX_CHARS: usize = 30;

/// Marker appended to a derived title that was cut short.
pub const TITLE_ELLIPSIS: &str = "...";

/// Author of a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Text typed by the user.
    User,
    /// Reply produced by the agent.
    Assistant,
    /// System notice.
    System,
    /// Narration of tool calls made by the agent while it works.
    ToolActivity,
}

impl Role {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::ToolActivity => "tool_activity",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            "tool_activity" => Ok(Self::ToolActivity),
            _ => Err(value.to_string()),
        }
    }
}

/// Sub-kind of a message.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Regular conversational message.
    #[default]
    Normal,
    /// Side-channel status narration; always created complete.
    ToolActivity,
}

/// A message stored in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message identifier.
    pub id: MessageId,
    /// Owning conversation (lookup only).
    pub conversation_id: ConversationId,
    /// Author role.
    pub role: Role,
    /// Text content; grows while streaming.
    pub content: String,
    /// Creation time, never updated afterwards.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Content may still change.
    #[serde(default)]
    pub is_streaming: bool,
    /// No further mutation will happen.
    #[serde(default)]
    pub is_complete: bool,
    /// Message sub-kind.
    #[serde(default)]
    pub message_type: MessageType,
}

/// Message fields supplied by the caller; id and timestamp are assigned by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMessage {
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Author role.
    pub role: Role,
    /// Initial content.
    pub content: String,
    /// Whether content may still change.
    pub is_streaming: bool,
    /// Whether the message is final.
    pub is_complete: bool,
    /// Message sub-kind.
    pub message_type: MessageType,
}

impl NewMessage {
    /// A complete message typed by the user.
    #[must_use]
    pub fn user(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self::complete(conversation_id, Role::User, content)
    }

    /// A complete assistant reply.
    #[must_use]
    pub fn assistant(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self::complete(conversation_id, Role::Assistant, content)
    }

    /// An empty assistant message that will be filled by a stream.
    #[must_use]
    pub const fn assistant_placeholder(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            role: Role::Assistant,
            content: String::new(),
            is_streaming: true,
            is_complete: false,
            message_type: MessageType::Normal,
        }
    }

    /// A tool-activity narration message.
    #[must_use]
    pub fn tool_activity(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            role: Role::ToolActivity,
            content: content.into(),
            is_streaming: false,
            is_complete: true,
            message_type: MessageType::ToolActivity,
        }
    }

    /// A complete message with an arbitrary role.
    #[must_use]
    pub fn complete(conversation_id: ConversationId, role: Role, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            role,
            content: content.into(),
            is_streaming: false,
            is_complete: true,
            message_type: MessageType::Normal,
        }
    }
}

/// A titled, ordered sequence of messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Conversation identifier.
    pub id: ConversationId,
    /// Display title.
    pub title: String,
    /// Messages in insertion order.
    pub messages: Vec<Message>,
    /// Creation time.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Last append or mutation time.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create an empty conversation.
    #[must_use]
    pub fn new(id: ConversationId, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move `updated_at` forward, never backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Last message, if any.
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Derive a conversation title from its first user message.
#[must_use]
pub fn derive_title(first_message: &str) -> String {
    let mut chars = first_message.chars();
    let title: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{title}{TITLE_ELLIPSIS}")
    } else {
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_title_short_is_verbatim() {
        assert_eq!(derive_title("Hello"), "Hello");
        let exact = "a".repeat(TITLE_MAX_CHARS);
        assert_eq!(derive_title(&exact), exact);
    }

    #[test]
    fn test_derive_title_long_is_truncated() {
        let long = "x".repeat(TITLE_MAX_CHARS + 5);
        let title = derive_title(&long);
        assert_eq!(title, format!("{}...", "x".repeat(TITLE_MAX_CHARS)));
    }

    #[test]
    fn test_derive_title_counts_characters_not_bytes() {
        let text = "é".repeat(TITLE_MAX_CHARS);
        assert_eq!(derive_title(&text), text);
    }

    #[test]
    fn test_role_round_trip() {
        for role in [Role::User, Role::Assistant, Role::System, Role::ToolActivity] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn test_new_message_flags() {
        let conversation = ConversationId::new();
        let placeholder = NewMessage::assistant_placeholder(conversation);
        assert!(placeholder.is_streaming);
        assert!(!placeholder.is_complete);

        let tool = NewMessage::tool_activity(conversation, "searching");
        assert!(tool.is_complete);
        assert!(!tool.is_streaming);
        assert_eq!(tool.message_type, MessageType::ToolActivity);
    }

    #[test]
    fn test_message_json_uses_camel_case() {
        let message = Message {
            id: MessageId::new(),
            conversation_id: ConversationId::new(),
            role: Role::ToolActivity,
            content: "calling search".to_string(),
            timestamp: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            is_streaming: false,
            is_complete: true,
            message_type: MessageType::ToolActivity,
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "tool_activity");
        assert_eq!(json["messageType"], "tool_activity");
        assert_eq!(json["isComplete"], true);
        assert_eq!(json["timestamp"], 1_700_000_000_000_i64);
    }
}
