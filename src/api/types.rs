//! Request and response shapes exchanged with the agent backend.

use serde::{Deserialize, Serialize};

use crate::chat::ids::ConversationId;

/// A chat request, used for both the plain and the streaming call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,
    /// Conversation the message belongs to.
    pub conversation_id: Option<ConversationId>,
}

impl ChatRequest {
    /// Build a request.
    #[must_use]
    pub fn new(message: impl Into<String>, conversation_id: Option<ConversationId>) -> Self {
        Self {
            message: message.into(),
            conversation_id,
        }
    }

    /// Form/query pairs in the backend's field naming.
    #[must_use]
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("message", self.message.clone())];
        if let Some(id) = self.conversation_id {
            fields.push(("conversationId", id.to_string()));
        }
        fields
    }
}

/// Reply to a plain chat call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatResponse {
    /// Generated reply text.
    pub result: String,
    /// Conversation id echoed from the request.
    pub conversation_id: Option<ConversationId>,
}

/// Typewriter settings pushed to the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypewriterConfig {
    /// Whether replies are revealed character by character.
    pub enabled: bool,
    /// Delay between characters, in milliseconds.
    pub delay: u64,
}

impl Default for TypewriterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: 50,
        }
    }
}

impl TypewriterConfig {
    /// Form fields for `POST /config/typewriter`.
    #[must_use]
    pub fn form_fields(&self) -> [(&'static str, String); 2] {
        [
            ("enable", self.enabled.to_string()),
            ("delay", self.delay.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_fields_skip_missing_conversation() {
        let request = ChatRequest::new("hi", None);
        assert_eq!(request.form_fields(), vec![("message", "hi".to_string())]);

        let id = ConversationId::new();
        let request = ChatRequest::new("hi", Some(id));
        assert_eq!(request.form_fields()[1], ("conversationId", id.to_string()));
    }

    #[test]
    fn test_typewriter_form_fields() {
        let config = TypewriterConfig {
            enabled: false,
            delay: 30,
        };
        assert_eq!(
            config.form_fields(),
            [("enable", "false".to_string()), ("delay", "30".to_string())]
        );
    }
}
